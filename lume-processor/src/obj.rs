use anyhow::{Context, Result, bail};
use lume_meshlet::SourceMesh;
use std::path::Path;

/// Loads every model of an OBJ file into one mesh.
///
/// Models without normals or texture coordinates get zeroed streams so the
/// merged attribute arrays stay aligned with the positions.
pub fn load_obj(path: &Path) -> Result<SourceMesh> {
    let (models, _materials) =
        tobj::load_obj(path, &tobj::GPU_LOAD_OPTIONS).with_context(|| format!("Failed to load OBJ file: {}", path.display()))?;
    if models.is_empty() {
        bail!("{} contains no models", path.display());
    }

    let any_normals = models.iter().any(|m| !m.mesh.normals.is_empty());
    let any_uvs = models.iter().any(|m| !m.mesh.texcoords.is_empty());

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();
    let mut index_offset = 0u32;

    for model in &models {
        let mesh = &model.mesh;
        let vertex_count = mesh.positions.len() / 3;
        positions.extend_from_slice(&mesh.positions[..vertex_count * 3]);
        if any_normals {
            if mesh.normals.len() >= vertex_count * 3 {
                normals.extend_from_slice(&mesh.normals[..vertex_count * 3]);
            } else {
                log::warn!("model {} has no normals, using +Y", model.name);
                normals.extend((0..vertex_count).flat_map(|_| [0.0, 1.0, 0.0]));
            }
        }
        if any_uvs {
            if mesh.texcoords.len() >= vertex_count * 2 {
                uvs.extend_from_slice(&mesh.texcoords[..vertex_count * 2]);
            } else {
                uvs.resize(uvs.len() + vertex_count * 2, 0.0);
            }
        }
        indices.extend(mesh.indices.iter().map(|&i| i + index_offset));
        index_offset += vertex_count as u32;
    }

    log::debug!(
        "{}: {} models, {} vertices, {} triangles",
        path.display(),
        models.len(),
        index_offset,
        indices.len() / 3
    );
    Ok(SourceMesh::from_flat(&positions, &normals, &uvs, &indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_obj(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn quad_is_triangulated() {
        let file = write_obj("v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n");
        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.positions.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.normals.is_empty());
    }

    #[test]
    fn models_are_merged() {
        let file = write_obj(
            "o a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n\
             o b\nv 5 0 0\nv 6 0 0\nv 5 1 0\nf 4 5 6\n",
        );
        let mesh = load_obj(file.path()).unwrap();
        assert_eq!(mesh.positions.len(), 6);
        assert_eq!(mesh.normals.len(), 6);
        assert_eq!(mesh.normals[0], [0.0, 0.0, 1.0]);
        assert_eq!(mesh.normals[5], [0.0, 1.0, 0.0]);
        // second model's indices point past the first model's vertices
        assert!(mesh.indices[3..].iter().all(|&i| i >= 3));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_obj(Path::new("does/not/exist.obj")).is_err());
    }
}
