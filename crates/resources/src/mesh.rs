//! Mesh decoding into flat, non-indexed vertex arrays.
//!
//! The renderer draws meshes with `vkCmdDraw` and no index buffer, so every
//! loader expands indices into one vertex per triangle corner. Meshes that
//! carry no vertex colors are colored by their normals.
//!
//! Supported formats are Wavefront OBJ (`.obj`) and glTF (`.gltf`, `.glb`).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use renderer_rhi::vertex::Vertex;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// Decoded vertices of one mesh, ready for upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
}

impl MeshData {
    /// The built-in triangle: three green vertices in the XY plane.
    pub fn triangle() -> Self {
        let green = Vec3::new(0.0, 1.0, 0.0);
        let corner = |x: f32, y: f32| Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, green, Vec2::ZERO);

        Self {
            vertices: vec![corner(1.0, 1.0), corner(-1.0, 1.0), corner(0.0, -1.0)],
        }
    }

    /// Loads a mesh, picking the decoder from the file extension.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] for a missing file,
    /// [`ResourceError::UnsupportedFormat`] for an unknown extension, and a
    /// decoder error for malformed content.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let mesh = match extension.as_deref() {
            Some("obj") => {
                let reader = BufReader::new(File::open(path)?);
                Self::from_obj_reader(reader, path)?
            }
            Some("gltf" | "glb") => Self::from_gltf(path)?,
            _ => return Err(ResourceError::UnsupportedFormat(path.to_path_buf())),
        };

        if mesh.vertices.is_empty() {
            return Err(ResourceError::NoGeometry(path.to_path_buf()));
        }

        info!(
            "Loaded mesh {:?}: {} vertices ({} triangles)",
            path,
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    /// Decodes OBJ text. Polygons with more than three corners are split
    /// into a triangle fan; texture V is flipped to Vulkan's top-left origin.
    pub fn from_obj_reader(reader: impl Read, path: &Path) -> ResourceResult<Self> {
        let data = obj::ObjData::load_buf(reader).map_err(|e| ResourceError::ObjLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let bad_index = |attribute: &'static str, index: usize| ResourceError::BadIndex {
            path: path.to_path_buf(),
            attribute,
            index,
        };

        let mut vertices = Vec::new();
        for group in data.objects.iter().flat_map(|object| &object.groups) {
            for polygon in &group.polys {
                for [a, b, c] in fan_triangles(polygon.0.len()) {
                    for corner in [a, b, c] {
                        let obj::IndexTuple(p, t, n) = polygon.0[corner];

                        let position = *data.position.get(p).ok_or_else(|| bad_index("position", p))?;
                        let normal = match n {
                            Some(n) => *data.normal.get(n).ok_or_else(|| bad_index("normal", n))?,
                            None => [0.0; 3],
                        };
                        let uv = match t {
                            Some(t) => *data.texture.get(t).ok_or_else(|| bad_index("uv", t))?,
                            None => [0.0; 2],
                        };

                        let normal = Vec3::from(normal);
                        vertices.push(Vertex::new(
                            Vec3::from(position),
                            normal,
                            normal,
                            Vec2::new(uv[0], 1.0 - uv[1]),
                        ));
                    }
                }
            }
        }

        debug!("Decoded OBJ {:?} into {} vertices", path, vertices.len());
        Ok(Self { vertices })
    }

    /// Decodes every triangle primitive of every mesh in a glTF file.
    pub fn from_gltf(path: &Path) -> ResourceResult<Self> {
        let (document, buffers, _images) =
            gltf::import(path).map_err(|e| ResourceError::GltfLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut vertices = Vec::new();
        for mesh in document.meshes() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    debug!("Skipping non-triangle primitive in {:?}", path);
                    continue;
                }

                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .ok_or(ResourceError::NoPositionData)?
                    .map(Vec3::from)
                    .collect();
                let normals: Vec<Vec3> = reader
                    .read_normals()
                    .map(|iter| iter.map(Vec3::from).collect())
                    .unwrap_or_else(|| vec![Vec3::ZERO; positions.len()]);
                let uvs: Vec<Vec2> = reader
                    .read_tex_coords(0)
                    .map(|iter| iter.into_f32().map(Vec2::from).collect())
                    .unwrap_or_else(|| vec![Vec2::ZERO; positions.len()]);
                let colors: Vec<Vec3> = reader
                    .read_colors(0)
                    .map(|iter| iter.into_rgb_f32().map(Vec3::from).collect())
                    .unwrap_or_else(|| normals.clone());

                let indices: Vec<u32> = match reader.read_indices() {
                    Some(indices) => indices.into_u32().collect(),
                    None => (0..positions.len() as u32).collect(),
                };

                for index in indices {
                    let i = index as usize;
                    let position = *positions.get(i).ok_or_else(|| ResourceError::BadIndex {
                        path: PathBuf::from(path),
                        attribute: "position",
                        index: i,
                    })?;
                    vertices.push(Vertex::new(
                        position,
                        normals.get(i).copied().unwrap_or(Vec3::ZERO),
                        colors.get(i).copied().unwrap_or(Vec3::ZERO),
                        uvs.get(i).copied().unwrap_or(Vec2::ZERO),
                    ));
                }
            }
        }

        Ok(Self { vertices })
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

/// Corner triples of a fan over a polygon with `corners` corners.
fn fan_triangles(corners: usize) -> impl Iterator<Item = [usize; 3]> {
    (1..corners.saturating_sub(1)).map(|i| [0, i, i + 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_triangle_is_green() {
        let triangle = MeshData::triangle();
        assert_eq!(triangle.vertex_count(), 3);
        assert!(
            triangle
                .vertices
                .iter()
                .all(|v| v.color == Vec3::new(0.0, 1.0, 0.0))
        );
        assert_eq!(triangle.vertices[2].position, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_fan_triangles() {
        assert_eq!(fan_triangles(3).collect::<Vec<_>>(), vec![[0, 1, 2]]);
        assert_eq!(
            fan_triangles(4).collect::<Vec<_>>(),
            vec![[0, 1, 2], [0, 2, 3]]
        );
        assert_eq!(fan_triangles(2).count(), 0);
    }

    #[test]
    fn test_obj_quad_is_triangulated() {
        let mesh = MeshData::from_obj_reader(QUAD_OBJ.as_bytes(), Path::new("quad.obj")).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 2);

        // Colors follow normals and V is flipped.
        let first = mesh.vertices[0];
        assert_eq!(first.color, Vec3::Z);
        assert_eq!(first.normal, Vec3::Z);
        assert_eq!(first.uv, Vec2::new(0.0, 1.0));
        assert_eq!(mesh.vertices[5].position, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_missing_file() {
        let result = MeshData::load(Path::new("does/not/exist.obj"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
