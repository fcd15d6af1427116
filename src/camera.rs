// src/camera.rs
// 屏幕空间相机：逻辑像素坐标，原点在左上角
use glam::{Mat4, Vec2};
use bytemuck::{Pod, Zeroable};

// 将发送到 GPU 的相机 Uniform 数据结构
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub needs_srgb_output_conversion: u32, // 0 for false, 1 for true
    pub _padding: [u32; 3], // 填充到 16 字节边界，使 CameraUniform 总大小为 80 字节
}

/// Maps the animator's draw space (logical pixels, y down) onto the surface.
#[derive(Debug)]
pub struct Camera {
    pub viewport_size: Vec2, // physical pixels
    pub scale_factor: f32,
}

impl Camera {
    pub fn new(viewport_width: u32, viewport_height: u32, scale_factor: f64) -> Self {
        let mut camera = Self { viewport_size: Vec2::ZERO, scale_factor: 1.0 };
        camera.set_scale_factor(scale_factor);
        camera.update_viewport(viewport_width, viewport_height);
        camera
    }

    /// 窗口大小改变时调用
    pub fn update_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport_size = Vec2::new(width as f32, height as f32);
        }
    }

    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        if scale_factor.is_finite() && scale_factor > 0.0 {
            self.scale_factor = scale_factor as f32;
        }
    }

    /// Viewport size in logical pixels, the unit the animator works in.
    pub fn logical_size(&self) -> Vec2 {
        self.viewport_size / self.scale_factor
    }

    /// 将屏幕物理像素坐标转换为逻辑像素坐标
    pub fn screen_to_world(&self, screen_coords: Vec2) -> Vec2 {
        screen_coords / self.scale_factor
    }

    pub fn build_view_projection_matrix(&self) -> Mat4 {
        let size = self.logical_size();
        // top = 0, bottom = height: y grows downwards like a 2D canvas
        Mat4::orthographic_rh(0.0, size.x, size.y, 0.0, -100.0, 100.0)
    }

    pub fn uniform(&self, needs_srgb_output_conversion: bool) -> CameraUniform {
        CameraUniform {
            view_proj: self.build_view_projection_matrix().to_cols_array_2d(),
            needs_srgb_output_conversion: needs_srgb_output_conversion as u32,
            _padding: [0; 3],
        }
    }
}
