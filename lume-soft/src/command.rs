use crate::kernel::Invocation;
use crate::{SoftBindGroup, SoftBuffer, SoftComputePipeline, SoftDevice};
use lume_core::device::{Buffer, CommandBuffer, CommandPool};
use lume_core::{LumeError, LumeResult};
use std::collections::HashMap;

pub struct SoftCommandPool;

impl CommandPool for SoftCommandPool {
    type Device = SoftDevice;
    type CommandBuffer = SoftCommandBuffer;

    fn allocate_command_buffer(&self) -> LumeResult<SoftCommandBuffer> {
        Ok(SoftCommandBuffer::default())
    }
}

enum Command {
    BindPipeline(SoftComputePipeline),
    BindGroup(u32, SoftBindGroup),
    Dispatch([u32; 3]),
    DispatchIndirect { buffer: SoftBuffer, offset: u64 },
    Fill { buffer: SoftBuffer, offset: u64, size: u64, value: u32 },
    Update { buffer: SoftBuffer, offset: u64, data: Vec<u8> },
    Copy { source: SoftBuffer, source_offset: u64, destination: SoftBuffer, destination_offset: u64, size: u64 },
    Barrier,
}

/// Records commands; `SoftDevice::submit` replays them in order.
#[derive(Default)]
pub struct SoftCommandBuffer {
    commands: Vec<Command>,
    recording: bool,
}

impl SoftCommandBuffer {
    pub(crate) fn execute(&self) -> LumeResult<()> {
        if self.recording {
            return Err(LumeError::SubmissionFailed("command buffer is still recording".to_string()));
        }

        let mut pipeline: Option<&SoftComputePipeline> = None;
        let mut groups: HashMap<u32, SoftBindGroup> = HashMap::new();

        for command in &self.commands {
            match command {
                Command::BindPipeline(p) => pipeline = Some(p),
                Command::BindGroup(index, group) => {
                    groups.insert(*index, group.clone());
                }
                Command::Dispatch(counts) => run_dispatch(pipeline, &groups, *counts)?,
                Command::DispatchIndirect { buffer, offset } => {
                    let mut counts = [0u32; 3];
                    buffer.read_data(*offset, bytemuck::cast_slice_mut(&mut counts))?;
                    run_dispatch(pipeline, &groups, counts)?;
                }
                Command::Fill { buffer, offset, size, value } => buffer.fill(*offset, *size, *value)?,
                Command::Update { buffer, offset, data } => buffer.write_data(*offset, data)?,
                Command::Copy { source, source_offset, destination, destination_offset, size } => {
                    destination.copy_from(source, *source_offset, *destination_offset, *size)?
                }
                Command::Barrier => {}
            }
        }
        Ok(())
    }
}

fn run_dispatch(
    pipeline: Option<&SoftComputePipeline>,
    groups: &HashMap<u32, SoftBindGroup>,
    counts: [u32; 3],
) -> LumeResult<()> {
    let pipeline = pipeline.ok_or(LumeError::Generic("dispatch without a bound compute pipeline"))?;
    let size = pipeline.kernel.workgroup_size;
    log::trace!("soft: dispatch {} {:?} x {:?}", pipeline.entry_point, counts, size);

    for wz in 0..counts[2] {
        for wy in 0..counts[1] {
            for wx in 0..counts[0] {
                for lz in 0..size[2] {
                    for ly in 0..size[1] {
                        for lx in 0..size[0] {
                            let invocation = Invocation {
                                global_id: [wx * size[0] + lx, wy * size[1] + ly, wz * size[2] + lz],
                                local_id: [lx, ly, lz],
                                workgroup_id: [wx, wy, wz],
                                workgroup_size: size,
                                num_workgroups: counts,
                                groups,
                            };
                            (pipeline.kernel.func)(&invocation)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

impl CommandBuffer for SoftCommandBuffer {
    type Device = SoftDevice;

    fn reset(&mut self) -> LumeResult<()> {
        self.commands.clear();
        self.recording = false;
        Ok(())
    }

    fn begin(&mut self) -> LumeResult<()> {
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn end(&mut self) -> LumeResult<()> {
        self.recording = false;
        Ok(())
    }

    fn bind_compute_pipeline(&mut self, pipeline: &SoftComputePipeline) {
        self.commands.push(Command::BindPipeline(pipeline.clone()));
    }

    fn bind_bind_group(&mut self, index: u32, bind_group: &SoftBindGroup) {
        self.commands.push(Command::BindGroup(index, bind_group.clone()));
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(Command::Dispatch([x, y, z]));
    }

    fn dispatch_indirect(&mut self, buffer: &SoftBuffer, offset: u64) {
        self.commands.push(Command::DispatchIndirect {
            buffer: buffer.clone(),
            offset,
        });
    }

    fn fill_buffer(&mut self, buffer: &SoftBuffer, offset: u64, size: u64, value: u32) {
        self.commands.push(Command::Fill {
            buffer: buffer.clone(),
            offset,
            size,
            value,
        });
    }

    fn update_buffer(&mut self, buffer: &SoftBuffer, offset: u64, data: &[u8]) {
        self.commands.push(Command::Update {
            buffer: buffer.clone(),
            offset,
            data: data.to_vec(),
        });
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: &SoftBuffer,
        source_offset: u64,
        destination: &SoftBuffer,
        destination_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::Copy {
            source: source.clone(),
            source_offset,
            destination: destination.clone(),
            destination_offset,
            size,
        });
    }

    fn compute_barrier(&mut self) {
        self.commands.push(Command::Barrier);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Slot, SoftDevice};
    use lume_core::device::*;
    use lume_core::LumeError;

    const DATA: Slot = Slot::new(0, 0);
    const ARGS: Slot = Slot::new(0, 1);

    fn storage(device: &SoftDevice, size: u64) -> crate::SoftBuffer {
        device
            .create_buffer(BufferDescriptor {
                size,
                usage: BufferUsage::STORAGE | BufferUsage::INDIRECT | BufferUsage::COPY_DST,
                mapped_at_creation: true,
            })
            .unwrap()
    }

    fn setup(device: &SoftDevice, data: &crate::SoftBuffer, args: &crate::SoftBuffer) -> (SoftPipelines, crate::SoftBindGroup) {
        let layout = device
            .create_bind_group_layout(BindGroupLayoutDescriptor {
                entries: vec![
                    BindGroupLayoutEntry {
                        binding: 0,
                        visibility: ShaderStage::COMPUTE,
                        ty: BindingType::StorageBuffer { read_only: false },
                    },
                    BindGroupLayoutEntry {
                        binding: 1,
                        visibility: ShaderStage::COMPUTE,
                        ty: BindingType::StorageBuffer { read_only: false },
                    },
                ],
            })
            .unwrap();
        let group = device
            .create_bind_group(BindGroupDescriptor {
                layout: &layout,
                entries: vec![
                    BindGroupEntry { binding: 0, resource: BindingResource::Buffer(data) },
                    BindGroupEntry { binding: 1, resource: BindingResource::Buffer(args) },
                ],
            })
            .unwrap();
        let pipeline_layout = device
            .create_pipeline_layout(PipelineLayoutDescriptor { bind_group_layouts: &[&layout] })
            .unwrap();
        let double = device
            .create_compute_pipeline(ComputePipelineDescriptor { entry_point: "double", layout: &pipeline_layout })
            .unwrap();
        let count = device
            .create_compute_pipeline(ComputePipelineDescriptor { entry_point: "count", layout: &pipeline_layout })
            .unwrap();
        (SoftPipelines { double, count }, group)
    }

    struct SoftPipelines {
        double: crate::SoftComputePipeline,
        count: crate::SoftComputePipeline,
    }

    fn register(device: &SoftDevice) {
        device.register_kernel("double", [4, 1, 1], |inv| {
            let i = inv.global_id[0] as usize;
            if i >= inv.len::<u32>(DATA)? {
                return Ok(());
            }
            let v: u32 = inv.read(DATA, i)?;
            inv.write(DATA, i, v * 2)
        });
        // Writes the number of workgroups needed to cover the data into the indirect args.
        device.register_kernel("count", [1, 1, 1], |inv| {
            let n = inv.len::<u32>(DATA)? as u32;
            inv.write(ARGS, 0, n.div_ceil(4))?;
            inv.write(ARGS, 1, 1u32)?;
            inv.write(ARGS, 2, 1u32)
        });
    }

    #[test]
    fn indirect_dispatch_reads_arguments_at_execution_time() {
        let device = SoftDevice::new();
        register(&device);
        let data = storage(&device, 10 * 4);
        let args = storage(&device, 12);
        let values: Vec<u32> = (0..10).collect();
        data.write_data(0, bytemuck::cast_slice(&values)).unwrap();
        let (pipelines, group) = setup(&device, &data, &args);

        let pool = device.create_command_pool().unwrap();
        let mut cmd = pool.allocate_command_buffer().unwrap();
        cmd.begin().unwrap();
        cmd.bind_bind_group(0, &group);
        cmd.bind_compute_pipeline(&pipelines.count);
        cmd.dispatch(1, 1, 1);
        cmd.compute_barrier();
        cmd.bind_compute_pipeline(&pipelines.double);
        cmd.dispatch_indirect(&args, 0);
        cmd.end().unwrap();

        // Nothing runs until submission.
        let mut before = [0u32; 10];
        data.read_data(0, bytemuck::cast_slice_mut(&mut before)).unwrap();
        assert_eq!(before.to_vec(), values);

        device.submit(&[&cmd]).unwrap();
        let mut after = [0u32; 10];
        data.read_data(0, bytemuck::cast_slice_mut(&mut after)).unwrap();
        let expected: Vec<u32> = values.iter().map(|v| v * 2).collect();
        assert_eq!(after.to_vec(), expected);
    }

    #[test]
    fn unknown_entry_point_is_unsupported() {
        let device = SoftDevice::new();
        assert!(!device.supports_kernel("missing"));
        let layout = device.create_pipeline_layout(PipelineLayoutDescriptor { bind_group_layouts: &[] }).unwrap();
        let err = device
            .create_compute_pipeline(ComputePipelineDescriptor { entry_point: "missing", layout: &layout })
            .err();
        assert!(matches!(err, Some(LumeError::UnsupportedKernel(name)) if name == "missing"));
    }

    #[test]
    fn submitting_while_recording_fails() {
        let device = SoftDevice::new();
        let pool = device.create_command_pool().unwrap();
        let mut cmd = pool.allocate_command_buffer().unwrap();
        cmd.begin().unwrap();
        assert!(device.submit(&[&cmd]).is_err());
    }
}
