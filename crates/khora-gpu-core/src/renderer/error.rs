// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Defines the hierarchy of error types for the GPU layer.
//!
//! Each failure class has its own enum: resource creation and access errors,
//! command recording misuse, swap chain errors, and device-level errors. The
//! latter wraps the others so a frame loop can propagate everything with `?`.

use std::fmt;

use crate::renderer::api::{GraphicsBackendType, ResourceKind};

/// An error related to the creation or use of a GPU resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The requested configuration is not supported by this device or backend.
    Unsupported(String),
    /// The descriptor is malformed (zero size, conflicting flags, bad binding...).
    InvalidDescriptor(String),
    /// The buffer was not created with the CPU access mode the operation needs.
    CpuAccessDenied {
        /// The buffer's label.
        label: String,
        /// The operation that was attempted.
        operation: &'static str,
    },
    /// An access reaches past the end of the resource.
    OutOfBounds {
        /// First byte accessed.
        offset: u64,
        /// Number of bytes accessed.
        size: u64,
        /// Size of the resource.
        capacity: u64,
    },
    /// The resource was used after `destroy` was called on it.
    Destroyed {
        /// Kind of the destroyed resource.
        kind: ResourceKind,
        /// Its label.
        label: String,
    },
    /// The owning device no longer exists.
    DeviceDropped,
    /// An error reported by the backend implementation.
    Backend(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::Unsupported(msg) => write!(f, "Unsupported configuration: {msg}"),
            ResourceError::InvalidDescriptor(msg) => write!(f, "Invalid descriptor: {msg}"),
            ResourceError::CpuAccessDenied { label, operation } => {
                write!(
                    f,
                    "Buffer '{label}' does not allow CPU access required by {operation}"
                )
            }
            ResourceError::OutOfBounds {
                offset,
                size,
                capacity,
            } => {
                write!(
                    f,
                    "Access of {size} bytes at offset {offset} exceeds resource size {capacity}"
                )
            }
            ResourceError::Destroyed { kind, label } => {
                write!(f, "{kind} '{label}' was already destroyed")
            }
            ResourceError::DeviceDropped => write!(f, "The owning device was dropped"),
            ResourceError::Backend(msg) => write!(f, "Backend-specific resource error: {msg}"),
        }
    }
}

impl std::error::Error for ResourceError {}

/// A command recording operation that was rejected.
///
/// Rejected operations leave the recorder and the native command list untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The operation is only valid inside a render pass.
    NotInRenderPass(&'static str),
    /// A render pass is already open.
    AlreadyInRenderPass,
    /// The operation is not valid inside a render pass.
    InRenderPass(&'static str),
    /// A draw or dispatch was issued without a matching pipeline.
    NoPipelineBound(&'static str),
    /// More debug groups were popped than pushed.
    DebugGroupUnderflow,
    /// The swap chain was already presented this frame.
    AlreadyPresented,
    /// The swap chain has no acquired backbuffer to present.
    NoAcquiredBackbuffer,
    /// The operation is not available on this recorder's queue.
    QueueMismatch(&'static str),
    /// A resource referenced by the command is invalid for it.
    InvalidResource(String),
    /// The owning device no longer exists.
    DeviceDropped,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::NotInRenderPass(op) => write!(f, "{op} requires an open render pass"),
            CommandError::AlreadyInRenderPass => write!(f, "A render pass is already open"),
            CommandError::InRenderPass(op) => write!(f, "{op} is not allowed inside a render pass"),
            CommandError::NoPipelineBound(op) => {
                write!(f, "{op} requires a bound pipeline of the matching kind")
            }
            CommandError::DebugGroupUnderflow => {
                write!(f, "Popped a debug group that was never pushed")
            }
            CommandError::AlreadyPresented => {
                write!(f, "Swap chain was already presented this frame")
            }
            CommandError::NoAcquiredBackbuffer => {
                write!(f, "Swap chain has no acquired backbuffer to present")
            }
            CommandError::QueueMismatch(op) => write!(f, "{op} is not supported on this queue"),
            CommandError::InvalidResource(msg) => write!(f, "Invalid resource: {msg}"),
            CommandError::DeviceDropped => write!(f, "The owning device was dropped"),
        }
    }
}

impl std::error::Error for CommandError {}

/// An error related to swap chain management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapChainError {
    /// The operation requires that no backbuffer is currently acquired.
    BackbufferAcquired,
    /// The requested extent exceeds the device limits.
    InvalidExtent {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The surface cannot be presented to by this backend.
    UnsupportedSurface(String),
    /// The owning device no longer exists.
    DeviceDropped,
    /// An error reported by the backend implementation.
    Backend(String),
}

impl fmt::Display for SwapChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapChainError::BackbufferAcquired => {
                write!(f, "A backbuffer is acquired and not yet presented")
            }
            SwapChainError::InvalidExtent { width, height } => {
                write!(f, "Invalid swap chain extent {width}x{height}")
            }
            SwapChainError::UnsupportedSurface(msg) => write!(f, "Unsupported surface: {msg}"),
            SwapChainError::DeviceDropped => write!(f, "The owning device was dropped"),
            SwapChainError::Backend(msg) => write!(f, "Backend-specific swap chain error: {msg}"),
        }
    }
}

impl std::error::Error for SwapChainError {}

/// A device-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// None of the candidate backends could create a device.
    NoCompatibleBackend(Vec<GraphicsBackendType>),
    /// The backend is not available on this machine.
    BackendUnsupported(GraphicsBackendType),
    /// The backend failed to initialize.
    InitializationFailed(String),
    /// The device was lost; it must be recreated.
    DeviceLost(String),
    /// The backend rejected a submission.
    SubmissionFailed(String),
    /// A resource error surfaced at device level.
    Resource(ResourceError),
    /// A swap chain error surfaced at device level.
    SwapChain(SwapChainError),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NoCompatibleBackend(attempted) => {
                write!(f, "No compatible graphics backend. Attempted: {attempted:?}")
            }
            DeviceError::BackendUnsupported(backend) => {
                write!(f, "Graphics backend {backend} is not supported on this system")
            }
            DeviceError::InitializationFailed(msg) => {
                write!(f, "Graphics device initialization failed: {msg}")
            }
            DeviceError::DeviceLost(reason) => write!(f, "Graphics device lost: {reason}"),
            DeviceError::SubmissionFailed(msg) => write!(f, "Command submission failed: {msg}"),
            DeviceError::Resource(err) => write!(f, "Resource error: {err}"),
            DeviceError::SwapChain(err) => write!(f, "Swap chain error: {err}"),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Resource(err) => Some(err),
            DeviceError::SwapChain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceError> for DeviceError {
    fn from(err: ResourceError) -> Self {
        DeviceError::Resource(err)
    }
}

impl From<SwapChainError> for DeviceError {
    fn from(err: SwapChainError) -> Self {
        DeviceError::SwapChain(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_device_error_wraps_sources() {
        let err: DeviceError = ResourceError::Unsupported("push constants".into()).into();
        assert!(err.source().is_some());
        assert_eq!(
            err.to_string(),
            "Resource error: Unsupported configuration: push constants"
        );
    }

    #[test]
    fn test_cpu_access_message_names_buffer() {
        let err = ResourceError::CpuAccessDenied {
            label: "vertices".into(),
            operation: "set_data",
        };
        assert!(err.to_string().contains("'vertices'"));
    }
}
