//! Direct3D 11 backend: adapter selection, the cube pipeline and per-image
//! render targets.
//!
//! Look for "INTERFACE POINT" comments to see where the OpenXR runtime and
//! the device hand objects to each other.

use std::mem::{self, ManuallyDrop};

use openxr as xr;
use tracing::{debug, info};
use windows::{
    Win32::Foundation::*, Win32::Graphics::Direct3D::Fxc::*, Win32::Graphics::Direct3D::*,
    Win32::Graphics::Direct3D11::*, Win32::Graphics::Dxgi::Common::*, Win32::Graphics::Dxgi::*,
    core::{Interface, PCSTR},
};

use crate::device::{GraphicsDevice, Viewport};
use crate::error::{Error, Result};

/// Swapchain color format handed to the runtime.
pub const COLOR_FORMAT: u32 = DXGI_FORMAT_R8G8B8A8_UNORM_SRGB.0 as u32;

pub type Requirements = <xr::D3D11 as xr::Graphics>::Requirements;
pub type SwapchainImage = <xr::D3D11 as xr::Graphics>::SwapchainImage;

#[repr(C)]
#[derive(Copy, Clone)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

const fn vertex(position: [f32; 3]) -> Vertex {
    // Each corner is colored by where it sits on the unit cube.
    Vertex {
        position,
        color: [
            (position[0] + 1.0) * 0.5,
            (position[1] + 1.0) * 0.5,
            (position[2] + 1.0) * 0.5,
        ],
    }
}

const CUBE_VERTICES: [Vertex; 8] = [
    vertex([-1.0, -1.0, -1.0]),
    vertex([-1.0, -1.0, 1.0]),
    vertex([-1.0, 1.0, -1.0]),
    vertex([-1.0, 1.0, 1.0]),
    vertex([1.0, -1.0, -1.0]),
    vertex([1.0, -1.0, 1.0]),
    vertex([1.0, 1.0, -1.0]),
    vertex([1.0, 1.0, 1.0]),
];

#[rustfmt::skip]
const CUBE_INDICES: [u16; 36] = [
    2, 1, 0, 2, 3, 1, // -x
    6, 4, 5, 6, 5, 7, // +x
    0, 1, 5, 0, 5, 4, // -y
    2, 6, 7, 2, 7, 3, // +y
    0, 4, 6, 0, 6, 2, // -z
    1, 3, 7, 1, 7, 5, // +z
];

trait DeviceResultExt<T> {
    fn context(self, what: &str) -> Result<T>;
}

impl<T> DeviceResultExt<T> for windows::core::Result<T> {
    fn context(self, what: &str) -> Result<T> {
        self.map_err(|err| Error::device(format!("{what}: {err}")))
    }
}

fn created<T>(object: Option<T>, what: &str) -> Result<T> {
    object.ok_or_else(|| Error::device(format!("{what} was not created")))
}

fn luid_string(low: u32, high: i32) -> String {
    format!("{high:08x}:{low:08x}")
}

/// Pipeline objects for the cube program.
struct CubePipeline {
    vertex_shader: ID3D11VertexShader,
    pixel_shader: ID3D11PixelShader,
    input_layout: ID3D11InputLayout,
    vertex_buffer: ID3D11Buffer,
    index_buffer: ID3D11Buffer,
    model_buffer: ID3D11Buffer,
    view_projection_buffer: ID3D11Buffer,
    rasterizer_state: ID3D11RasterizerState,
    depth_stencil_state: ID3D11DepthStencilState,
}

pub struct D3D11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    pipeline: CubePipeline,
}

impl D3D11Device {
    /// Creates the device on the adapter the runtime asked for
    /// (INTERFACE POINT: OpenXR -> Graphics).
    pub fn new(requirements: &Requirements) -> Result<Self> {
        let wanted = requirements.adapter_luid;
        let adapter = unsafe { find_adapter(wanted.LowPart as u32, wanted.HighPart as i32) }?;

        let min_level = requirements.min_feature_level as i32;
        let feature_levels = [D3D_FEATURE_LEVEL_11_1, D3D_FEATURE_LEVEL_11_0]
            .into_iter()
            .filter(|level| level.0 >= min_level)
            .collect::<Vec<_>>();
        if feature_levels.is_empty() {
            return Err(Error::device(format!(
                "runtime requires feature level {min_level:#x}, above what this backend supports"
            )));
        }

        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        let mut feature_level = D3D_FEATURE_LEVEL_11_0;
        unsafe {
            D3D11CreateDevice(
                &adapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                HMODULE::default(),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                Some(&feature_levels),
                D3D11_SDK_VERSION,
                Some(&mut device),
                Some(&mut feature_level),
                Some(&mut context),
            )
        }
        .context("D3D11CreateDevice")?;
        let device = created(device, "D3D11 device")?;
        let context = created(context, "D3D11 device context")?;
        info!(feature_level = format_args!("{:#x}", feature_level.0), "created D3D11 device");

        let pipeline = unsafe { CubePipeline::new(&device) }?;
        Ok(Self {
            device,
            context,
            pipeline,
        })
    }

    /// Graphics binding for session creation (INTERFACE POINT: Graphics -> OpenXR).
    /// The pointer stays valid for as long as this device is alive.
    pub fn session_create_info(&self) -> xr::d3d::SessionCreateInfoD3D11 {
        xr::d3d::SessionCreateInfoD3D11 {
            device: self.device.as_raw() as *mut _,
        }
    }

    /// Overwrites a whole constant buffer with one matrix.
    unsafe fn upload(&self, buffer: &ID3D11Buffer, matrix: &[f32; 16]) -> Result<()> {
        unsafe {
            let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
            self.context
                .Map(buffer, 0, D3D11_MAP_WRITE_DISCARD, 0, Some(&mut mapped))
                .map_err(|err| Error::draw(format!("Map constant buffer: {err}")))?;
            std::ptr::copy_nonoverlapping(matrix.as_ptr(), mapped.pData as *mut f32, matrix.len());
            self.context.Unmap(buffer, 0);
        }
        Ok(())
    }
}

/// Finds the DXGI adapter whose LUID the runtime reported.
unsafe fn find_adapter(low: u32, high: i32) -> Result<IDXGIAdapter> {
    unsafe {
        let factory: IDXGIFactory1 = CreateDXGIFactory1().context("CreateDXGIFactory1")?;
        let mut index = 0;
        // EnumAdapters1 fails with DXGI_ERROR_NOT_FOUND past the last adapter.
        while let Ok(adapter) = factory.EnumAdapters1(index) {
            index += 1;
            let desc = adapter.GetDesc1().context("IDXGIAdapter1::GetDesc1")?;
            if desc.AdapterLuid.LowPart == low && desc.AdapterLuid.HighPart == high {
                let name = String::from_utf16_lossy(&desc.Description);
                debug!(adapter = name.trim_end_matches('\0'), "found runtime adapter");
                return adapter.cast().context("IDXGIAdapter1 cast");
            }
        }
        Err(Error::NoMatchingAdapter(luid_string(low, high)))
    }
}

/// Compiles one entry point, surfacing the compiler log on failure.
unsafe fn compile_shader(source: &str, entry_point: PCSTR, target: PCSTR) -> Result<ID3DBlob> {
    unsafe {
        let mut blob: Option<ID3DBlob> = None;
        let mut error_blob: Option<ID3DBlob> = None;

        let result = D3DCompile(
            source.as_ptr() as *const _,
            source.len(),
            None,
            None,
            None,
            entry_point,
            target,
            D3DCOMPILE_OPTIMIZATION_LEVEL3,
            0,
            &mut blob,
            Some(&mut error_blob),
        );

        if let Err(err) = result {
            let message = match error_blob {
                Some(error_blob) => String::from_utf8_lossy(blob_bytes(&error_blob)).into_owned(),
                None => err.to_string(),
            };
            return Err(Error::device(format!("shader compilation failed: {message}")));
        }

        created(blob, "shader blob")
    }
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe { std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize()) }
}

/// GPU buffer initialised once from `data`.
unsafe fn immutable_buffer<T: Copy>(
    device: &ID3D11Device,
    data: &[T],
    bind: D3D11_BIND_FLAG,
    what: &str,
) -> Result<ID3D11Buffer> {
    unsafe {
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: mem::size_of_val(data) as u32,
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: bind.0 as u32,
            CPUAccessFlags: Default::default(),
            MiscFlags: Default::default(),
            StructureByteStride: 0,
        };
        let initial = D3D11_SUBRESOURCE_DATA {
            pSysMem: data.as_ptr() as *const _,
            SysMemPitch: 0,
            SysMemSlicePitch: 0,
        };
        let mut buffer: Option<ID3D11Buffer> = None;
        device
            .CreateBuffer(&desc, Some(&initial), Some(&mut buffer))
            .context(what)?;
        created(buffer, what)
    }
}

unsafe fn matrix_buffer(device: &ID3D11Device, what: &str) -> Result<ID3D11Buffer> {
    unsafe {
        let desc = D3D11_BUFFER_DESC {
            ByteWidth: mem::size_of::<[f32; 16]>() as u32,
            Usage: D3D11_USAGE_DYNAMIC,
            BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
            CPUAccessFlags: D3D11_CPU_ACCESS_WRITE.0 as u32,
            MiscFlags: Default::default(),
            StructureByteStride: 0,
        };
        let mut buffer: Option<ID3D11Buffer> = None;
        device
            .CreateBuffer(&desc, None, Some(&mut buffer))
            .context(what)?;
        created(buffer, what)
    }
}

impl CubePipeline {
    unsafe fn new(device: &ID3D11Device) -> Result<Self> {
        unsafe {
            let shader_code = include_str!("cube.hlsl");
            let vs_blob = compile_shader(
                shader_code,
                PCSTR(c"VSMain".as_ptr() as _),
                PCSTR(c"vs_5_0".as_ptr() as _),
            )?;
            let ps_blob = compile_shader(
                shader_code,
                PCSTR(c"PSMain".as_ptr() as _),
                PCSTR(c"ps_5_0".as_ptr() as _),
            )?;
            let vs_bytecode = blob_bytes(&vs_blob);
            let ps_bytecode = blob_bytes(&ps_blob);

            let mut vertex_shader: Option<ID3D11VertexShader> = None;
            device
                .CreateVertexShader(vs_bytecode, None, Some(&mut vertex_shader))
                .context("CreateVertexShader")?;
            let mut pixel_shader: Option<ID3D11PixelShader> = None;
            device
                .CreatePixelShader(ps_bytecode, None, Some(&mut pixel_shader))
                .context("CreatePixelShader")?;

            let input_layout_desc = [
                D3D11_INPUT_ELEMENT_DESC {
                    SemanticName: PCSTR(c"POSITION".as_ptr() as _),
                    SemanticIndex: 0,
                    Format: DXGI_FORMAT_R32G32B32_FLOAT,
                    InputSlot: 0,
                    AlignedByteOffset: 0,
                    InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                    InstanceDataStepRate: 0,
                },
                D3D11_INPUT_ELEMENT_DESC {
                    SemanticName: PCSTR(c"COLOR".as_ptr() as _),
                    SemanticIndex: 0,
                    Format: DXGI_FORMAT_R32G32B32_FLOAT,
                    InputSlot: 0,
                    AlignedByteOffset: 12,
                    InputSlotClass: D3D11_INPUT_PER_VERTEX_DATA,
                    InstanceDataStepRate: 0,
                },
            ];
            let mut input_layout: Option<ID3D11InputLayout> = None;
            device
                .CreateInputLayout(&input_layout_desc, vs_bytecode, Some(&mut input_layout))
                .context("CreateInputLayout")?;

            let vertex_buffer =
                immutable_buffer(device, &CUBE_VERTICES, D3D11_BIND_VERTEX_BUFFER, "vertex buffer")?;
            let index_buffer =
                immutable_buffer(device, &CUBE_INDICES, D3D11_BIND_INDEX_BUFFER, "index buffer")?;
            let model_buffer = matrix_buffer(device, "model constant buffer")?;
            let view_projection_buffer = matrix_buffer(device, "view-projection constant buffer")?;

            let rasterizer_desc = D3D11_RASTERIZER_DESC {
                FillMode: D3D11_FILL_SOLID,
                CullMode: D3D11_CULL_NONE,
                FrontCounterClockwise: FALSE,
                DepthBias: 0,
                DepthBiasClamp: 0.0,
                SlopeScaledDepthBias: 0.0,
                DepthClipEnable: TRUE,
                ScissorEnable: FALSE,
                MultisampleEnable: FALSE,
                AntialiasedLineEnable: FALSE,
            };
            let mut rasterizer_state: Option<ID3D11RasterizerState> = None;
            device
                .CreateRasterizerState(&rasterizer_desc, Some(&mut rasterizer_state))
                .context("CreateRasterizerState")?;

            let depth_stencil_desc = D3D11_DEPTH_STENCIL_DESC {
                DepthEnable: TRUE,
                DepthWriteMask: D3D11_DEPTH_WRITE_MASK_ALL,
                DepthFunc: D3D11_COMPARISON_LESS,
                StencilEnable: FALSE,
                StencilReadMask: 0,
                StencilWriteMask: 0,
                FrontFace: Default::default(),
                BackFace: Default::default(),
            };
            let mut depth_stencil_state: Option<ID3D11DepthStencilState> = None;
            device
                .CreateDepthStencilState(&depth_stencil_desc, Some(&mut depth_stencil_state))
                .context("CreateDepthStencilState")?;

            Ok(Self {
                vertex_shader: created(vertex_shader, "vertex shader")?,
                pixel_shader: created(pixel_shader, "pixel shader")?,
                input_layout: created(input_layout, "input layout")?,
                vertex_buffer,
                index_buffer,
                model_buffer,
                view_projection_buffer,
                rasterizer_state: created(rasterizer_state, "rasterizer state")?,
                depth_stencil_state: created(depth_stencil_state, "depth stencil state")?,
            })
        }
    }
}

impl GraphicsDevice for D3D11Device {
    type Image = SwapchainImage;
    type RenderTargetView = ID3D11RenderTargetView;
    type DepthStencilView = ID3D11DepthStencilView;

    /// Wraps a runtime-owned swapchain texture in a render target view
    /// (INTERFACE POINT: OpenXR -> Graphics).
    fn create_render_target_view(&mut self, image: &Self::Image) -> Result<Self::RenderTargetView> {
        unsafe {
            // The runtime owns the texture; don't release its reference.
            let texture = ManuallyDrop::new(ID3D11Texture2D::from_raw(*image as _));

            let mut texture_desc = D3D11_TEXTURE2D_DESC::default();
            texture.GetDesc(&mut texture_desc);

            let rtv_desc = D3D11_RENDER_TARGET_VIEW_DESC {
                Format: DXGI_FORMAT_R8G8B8A8_UNORM_SRGB,
                ViewDimension: if texture_desc.SampleDesc.Count > 1 {
                    D3D11_RTV_DIMENSION_TEXTURE2DMS
                } else {
                    D3D11_RTV_DIMENSION_TEXTURE2D
                },
                Anonymous: D3D11_RENDER_TARGET_VIEW_DESC_0 {
                    Texture2D: D3D11_TEX2D_RTV { MipSlice: 0 },
                },
            };

            let mut rtv: Option<ID3D11RenderTargetView> = None;
            self.device
                .CreateRenderTargetView(&*texture, Some(&rtv_desc), Some(&mut rtv))
                .context("CreateRenderTargetView")?;
            created(rtv, "render target view")
        }
    }

    fn create_depth_stencil_view(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Result<Self::DepthStencilView> {
        unsafe {
            let texture_desc = D3D11_TEXTURE2D_DESC {
                Width: width,
                Height: height,
                MipLevels: 1,
                ArraySize: 1,
                Format: DXGI_FORMAT_D32_FLOAT,
                SampleDesc: DXGI_SAMPLE_DESC {
                    Count: sample_count.max(1),
                    Quality: 0,
                },
                Usage: D3D11_USAGE_DEFAULT,
                BindFlags: D3D11_BIND_DEPTH_STENCIL.0 as u32,
                CPUAccessFlags: Default::default(),
                MiscFlags: Default::default(),
            };
            let mut texture: Option<ID3D11Texture2D> = None;
            self.device
                .CreateTexture2D(&texture_desc, None, Some(&mut texture))
                .context("CreateTexture2D (depth)")?;
            let texture = created(texture, "depth texture")?;

            let dsv_desc = D3D11_DEPTH_STENCIL_VIEW_DESC {
                Format: DXGI_FORMAT_D32_FLOAT,
                ViewDimension: if sample_count > 1 {
                    D3D11_DSV_DIMENSION_TEXTURE2DMS
                } else {
                    D3D11_DSV_DIMENSION_TEXTURE2D
                },
                Flags: 0,
                Anonymous: D3D11_DEPTH_STENCIL_VIEW_DESC_0 {
                    Texture2D: D3D11_TEX2D_DSV { MipSlice: 0 },
                },
            };
            let mut dsv: Option<ID3D11DepthStencilView> = None;
            self.device
                .CreateDepthStencilView(&texture, Some(&dsv_desc), Some(&mut dsv))
                .context("CreateDepthStencilView")?;
            // Only the view is kept; it holds its own reference to the texture.
            created(dsv, "depth stencil view")
        }
    }

    fn release_render_target_view(&mut self, view: Self::RenderTargetView) {
        drop(view);
    }

    fn release_depth_stencil_view(&mut self, view: Self::DepthStencilView) {
        drop(view);
    }

    fn bind_targets(
        &mut self,
        render_target: &Self::RenderTargetView,
        depth_stencil: &Self::DepthStencilView,
        viewport: Viewport,
        clear_color: [f32; 4],
    ) {
        unsafe {
            self.context
                .ClearRenderTargetView(render_target, &clear_color);
            self.context.ClearDepthStencilView(
                depth_stencil,
                (D3D11_CLEAR_DEPTH.0 | D3D11_CLEAR_STENCIL.0) as u32,
                1.0,
                0,
            );
            self.context
                .OMSetRenderTargets(Some(&[Some(render_target.clone())]), depth_stencil);
            self.context.RSSetViewports(Some(&[D3D11_VIEWPORT {
                TopLeftX: viewport.x,
                TopLeftY: viewport.y,
                Width: viewport.width,
                Height: viewport.height,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            }]));
        }
    }

    fn bind_cube_pipeline(&mut self) {
        let pipeline = &self.pipeline;
        unsafe {
            self.context.IASetInputLayout(&pipeline.input_layout);
            self.context.VSSetShader(&pipeline.vertex_shader, None);
            self.context.PSSetShader(&pipeline.pixel_shader, None);
            self.context.VSSetConstantBuffers(
                0,
                Some(&[
                    Some(pipeline.model_buffer.clone()),
                    Some(pipeline.view_projection_buffer.clone()),
                ]),
            );
            self.context.RSSetState(&pipeline.rasterizer_state);
            self.context
                .OMSetDepthStencilState(&pipeline.depth_stencil_state, 0);
            self.context
                .IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST);

            let stride = mem::size_of::<Vertex>() as u32;
            let offset = 0u32;
            self.context.IASetVertexBuffers(
                0,
                1,
                Some(&Some(pipeline.vertex_buffer.clone())),
                Some(&stride),
                Some(&offset),
            );
            self.context
                .IASetIndexBuffer(&pipeline.index_buffer, DXGI_FORMAT_R16_UINT, 0);
        }
    }

    fn set_view_projection(&mut self, view_projection: &[f32; 16]) -> Result<()> {
        unsafe { self.upload(&self.pipeline.view_projection_buffer, view_projection) }
    }

    fn draw_cube(&mut self, model: &[f32; 16]) -> Result<()> {
        unsafe {
            self.upload(&self.pipeline.model_buffer, model)?;
            self.context.DrawIndexed(CUBE_INDICES.len() as u32, 0, 0);
        }
        Ok(())
    }

    fn shutdown(self) {
        unsafe {
            self.context.ClearState();
            self.context.Flush();
        }
        debug!("released D3D11 device");
    }
}
