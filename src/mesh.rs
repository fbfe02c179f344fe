use glam::Vec3;
use std::f32::consts::{PI, TAU};
use wgpu::util::DeviceExt;

/// Vertex data for one procedural shape. Triangles wind counter-clockwise seen from outside.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl GeometryData {
    fn push(&mut self, position: Vec3, normal: Vec3) {
        self.positions.push(position.to_array());
        self.normals.push(normal.normalize_or_zero().to_array());
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Square in the XZ plane facing +Y, `size` units across.
    pub fn plane(size: f32) -> Self {
        let h = size * 0.5;
        let mut data = Self::default();
        for (x, z) in [(-h, -h), (-h, h), (h, h), (h, -h)] {
            data.push(Vec3::new(x, 0.0, z), Vec3::Y);
        }
        data.indices.extend_from_slice(&[0, 1, 2, 0, 2, 3]);
        data
    }

    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let mut data = Self::default();
        for normal in [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            let u = if normal.y.abs() > 0.5 { Vec3::X } else { Vec3::Y };
            let v = normal.cross(u);
            let base = data.positions.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                data.push((normal + u * su + v * sv) * h, normal);
            }
            data.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        data
    }

    /// Latitude/longitude sphere; `stacks` rings from pole to pole, `sectors` segments around.
    pub fn sphere(radius: f32, sectors: u32, stacks: u32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(2);
        let mut data = Self::default();
        for i in 0..stacks {
            let phi = -PI / 2.0 + PI * (i as f32 / (stacks - 1) as f32);
            for j in 0..=sectors {
                let theta = TAU * (j as f32 / sectors as f32);
                let normal = Vec3::new(phi.cos() * theta.cos(), phi.sin(), phi.cos() * theta.sin());
                data.push(normal * radius, normal);
            }
        }
        let row = sectors + 1;
        for i in 0..stacks - 1 {
            for j in 0..sectors {
                let a = i * row + j;
                let b = (i + 1) * row + j;
                data.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        data
    }

    /// Unit-height cone with its base at y = -0.5 and apex at y = 0.5.
    pub fn cone(radius: f32, resolution: u32) -> Self {
        let resolution = resolution.max(3);
        let slice = TAU / resolution as f32;
        let mut data = Self::default();

        for i in 0..resolution {
            let angle = slice * i as f32;
            data.push(Vec3::new(radius * angle.cos(), -0.5, radius * angle.sin()), Vec3::NEG_Y);
        }
        let center = resolution;
        data.push(Vec3::new(0.0, -0.5, 0.0), Vec3::NEG_Y);
        for i in 0..resolution {
            data.indices.extend_from_slice(&[(i + 1) % resolution, center, i]);
        }

        let side_normal = |angle: f32| Vec3::new(angle.cos(), radius, angle.sin());
        let body = data.positions.len() as u32;
        for i in 0..=resolution {
            let angle = slice * i as f32;
            data.push(Vec3::new(radius * angle.cos(), -0.5, radius * angle.sin()), side_normal(angle));
            data.push(Vec3::new(0.0, 0.5, 0.0), side_normal(angle + slice * 0.5));
        }
        for i in 0..resolution {
            let base = body + i * 2;
            data.indices.extend_from_slice(&[base, base + 1, base + 2]);
        }
        data
    }

    /// Ring in the XZ plane around the origin with a circular tube cross-section.
    pub fn torus(radius: f32, tube_radius: f32, sectors: u32, stacks: u32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(3);
        let mut data = Self::default();
        for i in 0..=stacks {
            let v = TAU * (i as f32 / stacks as f32);
            for j in 0..=sectors {
                let u = TAU * (j as f32 / sectors as f32);
                let normal = Vec3::new(v.cos() * u.cos(), v.sin(), v.cos() * u.sin());
                let ring = Vec3::new(u.cos(), 0.0, u.sin()) * radius;
                data.push(ring + normal * tube_radius, normal);
            }
        }
        let row = sectors + 1;
        for i in 0..stacks {
            for j in 0..sectors {
                let a = i * row + j;
                let b = (i + 1) * row + j;
                data.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        data
    }
}

/// Geometry uploaded once and shared read-only by every renderable that uses it.
#[derive(Debug)]
pub struct GpuMesh {
    pub position_buffer: wgpu::Buffer,
    pub normal_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, label: &str, geometry: &GeometryData) -> Self {
        let position_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Positions")),
            contents: bytemuck::cast_slice(&geometry.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let normal_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Normals")),
            contents: bytemuck::cast_slice(&geometry.normals),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Indices")),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { position_buffer, normal_buffer, index_buffer, index_count: geometry.indices.len() as u32 }
    }

    pub fn position_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }

    pub fn normal_layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}
