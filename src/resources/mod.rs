//! Loading of external assets: model geometry, textures, raw bytes.
//!
//! Model geometry is loaded here; materials are resolved and bound
//! separately (see [`crate::material`]) once every mesh's part has been
//! resolved against the naming policy.

use std::io::Cursor;

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector2, Vector3};
use wgpu::util::DeviceExt;

use crate::data_structures::model::{Bounds, ModelVertex};
use crate::resources::fetch::Location;

pub mod fetch;
pub mod texture;

/// One mesh's geometry plus the names the resolver works from.
///
/// `chain` is the owning node's name followed by its ancestors, closest
/// first, ending at the scene root.
#[derive(Debug)]
pub struct MeshSource {
    pub name: String,
    pub material_name: Option<String>,
    pub chain: Vec<String>,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
}

/// Geometry for the whole model, transforms baked, ready for materials.
#[derive(Debug)]
pub struct LoadedGeometry {
    pub meshes: Vec<MeshSource>,
    pub bounds: Bounds,
}

/// Load a GLB/glTF model. External buffer URIs resolve against the model's
/// own directory; embedded textures are ignored, texturing is driven by the
/// naming policy instead.
pub async fn load_model_glb(
    device: &wgpu::Device,
    bytes: &[u8],
    model_location: &Location,
    client: &reqwest::Client,
) -> anyhow::Result<LoadedGeometry> {
    let gltf = gltf::Gltf::from_reader(Cursor::new(bytes))?;

    // Load buffers
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                if let Some(blob) = gltf.blob.as_deref() {
                    buffer_data.push(blob.to_vec());
                }
            }
            gltf::buffer::Source::Uri(uri) => {
                if uri.starts_with("data:") {
                    anyhow::bail!("embedded data: buffer URIs are not supported, use GLB");
                }
                let location = model_location.parent().join(uri)?;
                let fetched = fetch::fetch(client, &location).await?;
                buffer_data.push(fetched.bytes);
            }
        }
    }

    let mut meshes = Vec::new();
    let mut bounds = Bounds::empty();
    for scene in gltf.scenes() {
        for node in scene.nodes() {
            visit_node(
                device,
                &node,
                &buffer_data,
                &[],
                Matrix4::identity(),
                &mut meshes,
                &mut bounds,
            );
        }
    }

    if meshes.is_empty() {
        anyhow::bail!("model contains no renderable meshes");
    }
    Ok(LoadedGeometry { meshes, bounds })
}

/// Depth-first walk keeping the ancestor name chain (closest first) and the
/// accumulated world transform. The chain stops at the scene root.
fn visit_node(
    device: &wgpu::Device,
    node: &gltf::Node,
    buffers: &[Vec<u8>],
    ancestors: &[String],
    parent_world: Matrix4<f32>,
    meshes: &mut Vec<MeshSource>,
    bounds: &mut Bounds,
) {
    let local: Matrix4<f32> = node.transform().matrix().into();
    let world = parent_world * local;
    let node_name = node.name().unwrap_or("").to_string();

    let mut chain = Vec::with_capacity(ancestors.len() + 1);
    chain.push(node_name.clone());
    chain.extend_from_slice(ancestors);

    if let Some(mesh) = node.mesh() {
        let display_name = if node_name.is_empty() {
            mesh.name().unwrap_or("unknown_mesh").to_string()
        } else {
            node_name.clone()
        };
        for primitive in mesh.primitives() {
            match build_primitive(device, &display_name, &primitive, buffers, world, bounds) {
                Some((vertex_buffer, index_buffer, num_elements)) => meshes.push(MeshSource {
                    name: display_name.clone(),
                    material_name: primitive.material().name().map(str::to_string),
                    chain: chain.clone(),
                    vertex_buffer,
                    index_buffer,
                    num_elements,
                }),
                None => {
                    log::warn!(
                        "mesh {:?} primitive {} has no positions, skipped",
                        display_name,
                        primitive.index()
                    );
                }
            }
        }
    }

    for child in node.children() {
        visit_node(device, &child, buffers, &chain, world, meshes, bounds);
    }
}

fn build_primitive(
    device: &wgpu::Device,
    name: &str,
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    world: Matrix4<f32>,
    bounds: &mut Bounds,
) -> Option<(wgpu::Buffer, wgpu::Buffer, u32)> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));

    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    let mut vertices: Vec<ModelVertex> = positions
        .iter()
        .map(|p| ModelVertex {
            position: *p,
            ..Default::default()
        })
        .collect();

    if let Some(normals) = reader.read_normals() {
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            vertex.normal = normal;
        }
    }
    if let Some(tex_coords) = reader.read_tex_coords(0).map(|t| t.into_f32()) {
        for (vertex, uv) in vertices.iter_mut().zip(tex_coords) {
            vertex.tex_coords = uv;
        }
    }
    // Ambient occlusion samples the secondary UV set; synthesize it as a
    // copy of the primary when the asset only authored one.
    match reader.read_tex_coords(1).map(|t| t.into_f32()) {
        Some(tex_coords) => {
            for (vertex, uv) in vertices.iter_mut().zip(tex_coords) {
                vertex.tex_coords_ao = uv;
            }
        }
        None => {
            for vertex in vertices.iter_mut() {
                vertex.tex_coords_ao = vertex.tex_coords;
            }
        }
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(raw) => raw.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };

    if reader.read_normals().is_none() {
        compute_normals(&mut vertices, &indices);
    }

    match reader.read_tangents() {
        Some(tangents) => {
            for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
                // glTF tangents are vec4; w carries the bitangent sign.
                let t = Vector3::new(tangent[0], tangent[1], tangent[2]);
                let n: Vector3<f32> = vertex.normal.into();
                vertex.tangent = t.into();
                vertex.bitangent = (n.cross(t) * tangent[3]).into();
            }
        }
        None => compute_tangents(&mut vertices, &indices),
    }

    bake_world_transform(&mut vertices, world, bounds);

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{:?} Vertex Buffer", name)),
        contents: bytemuck::cast_slice(&vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{:?} Index Buffer", name)),
        contents: bytemuck::cast_slice(&indices),
        usage: wgpu::BufferUsages::INDEX,
    });

    Some((vertex_buffer, index_buffer, indices.len() as u32))
}

fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    for c in indices.chunks(3) {
        if c.len() < 3 {
            continue;
        }
        let p0: Vector3<f32> = vertices[c[0] as usize].position.into();
        let p1: Vector3<f32> = vertices[c[1] as usize].position.into();
        let p2: Vector3<f32> = vertices[c[2] as usize].position.into();
        let face = (p1 - p0).cross(p2 - p0);
        for &i in c {
            let n: Vector3<f32> = vertices[i as usize].normal.into();
            vertices[i as usize].normal = (n + face).into();
        }
    }
    for vertex in vertices.iter_mut() {
        let n: Vector3<f32> = vertex.normal.into();
        if n.magnitude2() > 0.0 {
            vertex.normal = n.normalize().into();
        }
    }
}

/// Per-triangle tangent accumulation for assets that ship none. Bitangents
/// are flipped to match the WGPU texture coordinate system.
fn compute_tangents(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut triangles_included = vec![0u32; vertices.len()];
    for c in indices.chunks(3) {
        if c.len() < 3 {
            continue;
        }
        let v0 = vertices[c[0] as usize];
        let v1 = vertices[c[1] as usize];
        let v2 = vertices[c[2] as usize];

        let pos0: Vector3<f32> = v0.position.into();
        let pos1: Vector3<f32> = v1.position.into();
        let pos2: Vector3<f32> = v2.position.into();
        let uv0: Vector2<f32> = v0.tex_coords.into();
        let uv1: Vector2<f32> = v1.tex_coords.into();
        let uv2: Vector2<f32> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        let denom = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if denom.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / denom;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for &i in c {
            let v = &mut vertices[i as usize];
            v.tangent = (tangent + Vector3::from(v.tangent)).into();
            v.bitangent = (bitangent + Vector3::from(v.bitangent)).into();
            triangles_included[i as usize] += 1;
        }
    }

    for (i, n) in triangles_included.into_iter().enumerate() {
        if n > 0 {
            let denom = 1.0 / n as f32;
            let v = &mut vertices[i];
            v.tangent = (Vector3::from(v.tangent) * denom).into();
            v.bitangent = (Vector3::from(v.bitangent) * denom).into();
        }
    }
}

/// Bake the node's world transform into the vertex data so rendering needs
/// no hierarchy, and fold the transformed positions into the model bounds.
fn bake_world_transform(vertices: &mut [ModelVertex], world: Matrix4<f32>, bounds: &mut Bounds) {
    if world == Matrix4::identity() {
        for vertex in vertices.iter_mut() {
            bounds.include(vertex.position.into());
        }
        return;
    }

    let linear = Matrix3::from_cols(
        world.x.truncate(),
        world.y.truncate(),
        world.z.truncate(),
    );
    let normal_matrix = linear
        .invert()
        .map(|inv| inv.transpose())
        .unwrap_or(linear);

    for vertex in vertices.iter_mut() {
        let p = world.transform_point(Point3::from(vertex.position));
        vertex.position = p.into();
        bounds.include(p);

        let n = normal_matrix * Vector3::from(vertex.normal);
        if n.magnitude2() > 0.0 {
            vertex.normal = n.normalize().into();
        }
        let t = linear * Vector3::from(vertex.tangent);
        if t.magnitude2() > 0.0 {
            vertex.tangent = t.normalize().into();
        }
        let b = linear * Vector3::from(vertex.bitangent);
        if b.magnitude2() > 0.0 {
            vertex.bitangent = b.normalize().into();
        }
    }
}
