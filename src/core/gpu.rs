//! GPU compute pipeline.
//!
//! Offloads a single transform to a WGSL compute kernel through wgpu. The
//! host side is a small state machine:
//!
//! ```text
//! Uninitialized -> PlatformSelected -> ContextCreated -> ProgramBuilt
//!               -> KernelReady -> Dispatched -> Completed
//! ```
//!
//! with `Failed` reachable from the build step and from dispatch/readback.
//!
//! Resources are owned in a fixed chain: [`DeviceContext`] owns the device
//! and queue (and keeps the instance alive until they are gone),
//! `DeviceBuffers` owns the per-run buffers, `DeviceProgram` owns the shader
//! module and pipeline. Buffers and program are rebuilt for every run, so a
//! failed build never leaves state behind for the next one.
//!
//! Binding layout is positional and shared by every kernel:
//! bindings 0, 1, 2 are read-only inputs, 3 is the packed output and 4 is a
//! uniform [`DispatchParams`] block.

use crate::core::error::{DeviceError, DeviceResult};
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use wgpu::util::DeviceExt;

/// Side of the square workgroup every bundled kernel declares.
pub const WORKGROUP_SIZE: u32 = 16;

/// Entry point of the composite kernel.
pub const COMPOSITE_ENTRY_POINT: &str = "combine_images";

/// Default composite kernel, compiled into the binary.
pub const DEFAULT_COMPOSITE_KERNEL: &str = include_str!("../../kernels/combine_images.wgsl");

/// Bundled per-stage kernels.
pub const STAGE_KERNELS: &str = include_str!("../../kernels/stages.wgsl");

/// Number of input bindings.
pub const INPUT_SLOTS: usize = 3;

// ============================================================================
// State and adapter info
// ============================================================================

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Uninitialized,
    PlatformSelected,
    ContextCreated,
    ProgramBuilt,
    KernelReady,
    Dispatched,
    Completed,
    Failed,
}

/// A compute adapter as seen during enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterSummary {
    pub index: usize,
    pub name: String,
    pub backend: String,
    pub device_type: String,
}

impl AdapterSummary {
    fn from_info(index: usize, info: &wgpu::AdapterInfo) -> Self {
        Self {
            index,
            name: info.name.clone(),
            backend: format!("{:?}", info.backend),
            device_type: format!("{:?}", info.device_type),
        }
    }
}

impl fmt::Display for AdapterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}, {})", self.index, self.name, self.backend, self.device_type)
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Enumerate compute adapters across all backends, in selection order.
pub fn list_devices() -> Vec<AdapterSummary> {
    let instance = create_instance();
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .enumerate()
        .map(|(index, adapter)| AdapterSummary::from_info(index, &adapter.get_info()))
        .collect()
}

// ============================================================================
// Kernel source and host-side validation
// ============================================================================

/// WGSL program text plus the entry point to run.
#[derive(Debug, Clone)]
pub struct KernelSource {
    label: String,
    source: Cow<'static, str>,
    entry_point: String,
}

impl KernelSource {
    /// A kernel from arbitrary WGSL text.
    pub fn from_wgsl(
        label: impl Into<String>,
        source: impl Into<Cow<'static, str>>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            entry_point: entry_point.into(),
        }
    }

    /// One of the bundled stage kernels.
    pub fn stage(entry_point: &str) -> Self {
        Self::from_wgsl(format!("stages.wgsl:{}", entry_point), STAGE_KERNELS, entry_point)
    }

    /// The compiled-in composite kernel.
    pub fn default_composite() -> Self {
        Self::from_wgsl("combine_images.wgsl", DEFAULT_COMPOSITE_KERNEL, COMPOSITE_ENTRY_POINT)
    }

    /// Read a composite kernel from disk.
    pub fn composite_from_file(path: impl AsRef<Path>) -> DeviceResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| DeviceError::KernelSource {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Ok(Self::from_wgsl(path.display().to_string(), source, COMPOSITE_ENTRY_POINT))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Parse and validate a program on the host.
///
/// Returns `DeviceError::Build` carrying the diagnostic text when the source
/// does not parse, does not validate, or lacks the compute entry point.
pub fn validate_program(kernel: &KernelSource) -> DeviceResult<()> {
    let build_error = |log: String| DeviceError::Build {
        entry_point: kernel.entry_point.clone(),
        log,
    };

    let module = naga::front::wgsl::parse_str(kernel.source()).map_err(|e| build_error(e.emit_to_string(kernel.source())))?;

    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
        .map_err(|e| build_error(e.emit_to_string(kernel.source())))?;

    let has_entry = module
        .entry_points
        .iter()
        .any(|ep| ep.name == kernel.entry_point && ep.stage == naga::ShaderStage::Compute);
    if !has_entry {
        let available: Vec<_> = module.entry_points.iter().map(|ep| ep.name.as_str()).collect();
        return Err(build_error(format!(
            "{}: no compute entry point named `{}` (found: [{}])",
            kernel.label,
            kernel.entry_point,
            available.join(", ")
        )));
    }
    Ok(())
}

// ============================================================================
// Dispatch description
// ============================================================================

/// Uniform block bound at binding 4.
///
/// `width`/`height` are the output grid; the meaning of `param0..param4`
/// depends on the kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchParams {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub param0: u32,
    pub param1: u32,
    pub param2: u32,
    pub param3: u32,
    pub param4: u32,
}

/// Everything a single kernel run needs besides the program.
#[derive(Debug, Clone)]
pub struct DispatchRequest<'a> {
    /// Up to three input byte slices, bound in order. Missing slots get a
    /// placeholder word.
    pub inputs: Vec<Cow<'a, [u8]>>,
    /// Output length in bytes.
    pub output_len: usize,
    pub params: DispatchParams,
}

impl DispatchRequest<'_> {
    /// Workgroup counts covering the `width × height` grid.
    pub fn workgroups(&self) -> (u32, u32) {
        (
            self.params.width.div_ceil(WORKGROUP_SIZE),
            self.params.height.div_ceil(WORKGROUP_SIZE),
        )
    }
}

/// Round a byte length up to whole `u32` words, minimum one word.
fn padded_len(len: usize) -> usize {
    len.div_ceil(4).max(1) * 4
}

fn padded_bytes(bytes: &[u8]) -> Cow<'_, [u8]> {
    let len = padded_len(bytes.len());
    if len == bytes.len() {
        Cow::Borrowed(bytes)
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(len, 0);
        Cow::Owned(padded)
    }
}

// ============================================================================
// Ownership chain
// ============================================================================

/// Device and queue for one selected adapter.
///
/// Fields drop top to bottom; the instance is declared last so it outlives
/// the device objects created from it.
pub struct DeviceContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter: AdapterSummary,
    _instance: wgpu::Instance,
}

impl DeviceContext {
    /// Select the adapter at `index` and create a device on it.
    pub fn open(index: usize) -> DeviceResult<Self> {
        let mut state = PipelineState::Uninitialized;
        Self::open_tracked(index, &mut state)
    }

    fn open_tracked(index: usize, state: &mut PipelineState) -> DeviceResult<Self> {
        let instance = create_instance();
        let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let available = adapters.len();
        if index >= available {
            return Err(DeviceError::DeviceUnavailable { index, available });
        }
        let adapter = adapters.swap_remove(index);
        let summary = AdapterSummary::from_info(index, &adapter.get_info());
        log::debug!("Selected compute adapter {}", summary);
        *state = PipelineState::PlatformSelected;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pixbench"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| DeviceError::DeviceRequest(e.to_string()))?;
        *state = PipelineState::ContextCreated;

        Ok(Self {
            device,
            queue,
            adapter: summary,
            _instance: instance,
        })
    }

    pub fn adapter(&self) -> &AdapterSummary {
        &self.adapter
    }

    fn bind_group_layout(&self) -> wgpu::BindGroupLayout {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pixbench::bindings"),
            entries: &[
                storage(0, true),
                storage(1, true),
                storage(2, true),
                storage(3, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        })
    }

    /// Build the program inside a validation error scope.
    fn build_program(&self, kernel: &KernelSource) -> DeviceResult<DeviceProgram> {
        validate_program(kernel)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kernel.label()),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(kernel.source())),
        });
        let bind_group_layout = self.bind_group_layout();
        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pixbench::layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label()),
            layout: Some(&layout),
            module: &module,
            entry_point: Some(kernel.entry_point()),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(DeviceError::Build {
                entry_point: kernel.entry_point.clone(),
                log: error.to_string(),
            });
        }

        Ok(DeviceProgram {
            pipeline,
            bind_group_layout,
            _module: module,
        })
    }

    fn create_buffers(&self, request: &DispatchRequest<'_>) -> DeviceBuffers {
        let placeholder = [0u8; 4];
        let inputs = (0..INPUT_SLOTS)
            .map(|slot| {
                let bytes = request.inputs.get(slot).map(|b| padded_bytes(b)).unwrap_or(Cow::Borrowed(&placeholder[..]));
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("pixbench::input"),
                    contents: &bytes,
                    usage: wgpu::BufferUsages::STORAGE,
                })
            })
            .collect();

        let output_size = padded_len(request.output_len) as u64;
        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixbench::output"),
            size: output_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pixbench::readback"),
            size: output_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pixbench::params"),
            contents: bytemuck::bytes_of(&request.params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        DeviceBuffers {
            inputs,
            output,
            readback,
            params,
            output_len: request.output_len,
        }
    }
}

/// Per-run buffers.
struct DeviceBuffers {
    inputs: Vec<wgpu::Buffer>,
    output: wgpu::Buffer,
    readback: wgpu::Buffer,
    params: wgpu::Buffer,
    output_len: usize,
}

/// Compiled program for one entry point.
struct DeviceProgram {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    _module: wgpu::ShaderModule,
}

// ============================================================================
// Pipeline
// ============================================================================

/// A device context plus the state of the most recent run.
pub struct GpuPipeline {
    context: DeviceContext,
    state: PipelineState,
}

impl GpuPipeline {
    /// Select the adapter at `device_index` and create the context.
    pub fn new(device_index: usize) -> DeviceResult<Self> {
        let mut state = PipelineState::Uninitialized;
        let context = DeviceContext::open_tracked(device_index, &mut state)?;
        Ok(Self { context, state })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn adapter(&self) -> &AdapterSummary {
        self.context.adapter()
    }

    /// Build `kernel`, run it once over `request` and read the output back.
    pub fn run(&mut self, kernel: &KernelSource, request: &DispatchRequest<'_>) -> DeviceResult<Vec<u8>> {
        self.state = PipelineState::ContextCreated;
        let result = self.run_inner(kernel, request);
        if let Err(error) = &result {
            self.state = PipelineState::Failed;
            match error.build_log() {
                Some(build_log) => log::error!("Kernel `{}` failed to build:\n{}", kernel.entry_point(), build_log),
                None => log::error!("Kernel `{}` failed: {}", kernel.entry_point(), error),
            }
        }
        result
    }

    fn run_inner(&mut self, kernel: &KernelSource, request: &DispatchRequest<'_>) -> DeviceResult<Vec<u8>> {
        let program = self.context.build_program(kernel)?;
        self.state = PipelineState::ProgramBuilt;

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let buffers = self.context.create_buffers(request);
        let mut entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
            .inputs
            .iter()
            .enumerate()
            .map(|(slot, buffer)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: 3,
            resource: buffers.output.as_entire_binding(),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 4,
            resource: buffers.params.as_entire_binding(),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pixbench::bind_group"),
            layout: &program.bind_group_layout,
            entries: &entries,
        });
        self.state = PipelineState::KernelReady;

        let (groups_x, groups_y) = request.workgroups();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("pixbench::encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&program.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        encoder.copy_buffer_to_buffer(&buffers.output, 0, &buffers.readback, 0, buffers.output.size());
        self.context.queue.submit(Some(encoder.finish()));
        self.state = PipelineState::Dispatched;

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(error) = validation.or(out_of_memory) {
            return Err(DeviceError::Execution(error.to_string()));
        }

        let output = read_back(device, &buffers)?;
        self.state = PipelineState::Completed;
        log::debug!(
            "Kernel `{}` dispatched {}x{} workgroups on {}",
            kernel.entry_point(),
            groups_x,
            groups_y,
            self.context.adapter.name
        );
        Ok(output)
    }
}

/// Block until the queue drains, then copy the output bytes to the host.
fn read_back(device: &wgpu::Device, buffers: &DeviceBuffers) -> DeviceResult<Vec<u8>> {
    let slice = buffers.readback.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| DeviceError::Execution("readback callback dropped".to_string()))?
        .map_err(|e| DeviceError::Execution(format!("readback map failed: {}", e)))?;

    let output = {
        let mapped = slice.get_mapped_range();
        mapped[..buffers.output_len].to_vec()
    };
    buffers.readback.unmap();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First adapter, or `None` on machines without one.
    fn try_pipeline() -> Option<GpuPipeline> {
        GpuPipeline::new(0).ok()
    }

    #[test]
    fn test_bundled_kernels_validate() {
        for entry in ["convolve", "erode", "resize", "grayscale", "threshold", "sobel"] {
            validate_program(&KernelSource::stage(entry)).unwrap();
        }
        validate_program(&KernelSource::default_composite()).unwrap();
    }

    #[test]
    fn test_syntax_error_yields_build_log() {
        let kernel = KernelSource::from_wgsl("broken.wgsl", "fn combine_images( {", COMPOSITE_ENTRY_POINT);
        let error = validate_program(&kernel).unwrap_err();
        let log = error.build_log().unwrap();
        assert!(!log.is_empty());
    }

    #[test]
    fn test_missing_entry_point_is_build_error() {
        let kernel = KernelSource::stage("sharpen");
        let error = validate_program(&kernel).unwrap_err();
        assert!(error.build_log().unwrap().contains("sharpen"));
    }

    #[test]
    fn test_missing_kernel_file() {
        let error = KernelSource::composite_from_file("/nonexistent/kernel.wgsl").unwrap_err();
        assert!(matches!(error, DeviceError::KernelSource { .. }));
    }

    #[test]
    fn test_out_of_range_device_index() {
        let available = list_devices().len();
        assert!(matches!(
            GpuPipeline::new(available + 7),
            Err(DeviceError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_padding_and_workgroups() {
        assert_eq!(padded_len(0), 4);
        assert_eq!(padded_len(5), 8);
        assert_eq!(padded_bytes(&[1, 2, 3]).as_ref(), &[1, 2, 3, 0]);
        let request = DispatchRequest {
            inputs: Vec::new(),
            output_len: 0,
            params: DispatchParams {
                width: 33,
                height: 16,
                ..Default::default()
            },
        };
        assert_eq!(request.workgroups(), (3, 1));
    }

    #[test]
    fn test_threshold_kernel_on_device() {
        let Some(mut pipeline) = try_pipeline() else {
            return;
        };
        let samples: Vec<u8> = (0..35u32).map(|v| (v * 7) as u8).collect();
        let request = DispatchRequest {
            inputs: vec![Cow::Borrowed(&samples[..])],
            output_len: samples.len(),
            params: DispatchParams {
                width: 7,
                height: 5,
                channels: 1,
                param0: 100,
                ..Default::default()
            },
        };
        let output = pipeline.run(&KernelSource::stage("threshold"), &request).unwrap();
        let expected: Vec<u8> = samples.iter().map(|&v| if v >= 100 { 255 } else { 0 }).collect();
        assert_eq!(output, expected);
        assert_eq!(pipeline.state(), PipelineState::Completed);
    }

    #[test]
    fn test_device_build_failure_marks_failed() {
        let Some(mut pipeline) = try_pipeline() else {
            return;
        };
        let kernel = KernelSource::from_wgsl("broken.wgsl", "@compute fn combine_images() {", COMPOSITE_ENTRY_POINT);
        let request = DispatchRequest {
            inputs: Vec::new(),
            output_len: 4,
            params: DispatchParams::default(),
        };
        assert!(matches!(pipeline.run(&kernel, &request), Err(DeviceError::Build { .. })));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }
}
