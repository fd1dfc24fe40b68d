use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Create a UV sphere of unit radius centred at the origin.
///
/// Instances scale it by their particle radius. Normals equal positions.
pub fn create_sphere_geometry(lat_segments: u32, lon_segments: u32) -> (Vec<Vertex>, Vec<u16>) {
    let lat_segments = lat_segments.max(2);
    let lon_segments = lon_segments.max(3);

    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    // Generate vertices
    for lat in 0..=lat_segments {
        let v = lat as f32 / lat_segments as f32;
        let theta = std::f32::consts::PI * v;
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        for lon in 0..=lon_segments {
            let u = lon as f32 / lon_segments as f32;
            let phi = 2.0 * std::f32::consts::PI * u;

            let position = [phi.cos() * sin_theta, cos_theta, phi.sin() * sin_theta];
            vertices.push(Vertex {
                position,
                normal: position,
                uv: [u, v],
            });
        }
    }

    // Generate indices
    for lat in 0..lat_segments {
        for lon in 0..lon_segments {
            let first = (lat * (lon_segments + 1) + lon) as u16;
            let second = first + lon_segments as u16 + 1;

            // Two triangles per quad, counter-clockwise seen from outside
            indices.push(first);
            indices.push(first + 1);
            indices.push(second);

            indices.push(second);
            indices.push(first + 1);
            indices.push(second + 1);
        }
    }

    (vertices, indices)
}
