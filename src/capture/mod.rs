//! Capture sources and capture units
//!
//! `traits` defines the backend boundary, `screen` and `device` turn raw
//! sources into session units, `synthetic` is a hardware-free backend and
//! `native` records camera and microphone from host devices.

pub mod device;
pub mod native;
pub mod screen;
pub mod synthetic;
pub mod traits;

pub use device::DeviceCaptureUnit;
pub use native::NativeDeviceBackend;
pub use screen::{resolve_target, ScreenCaptureUnit, ScreenOptions};
pub use synthetic::{Faults, SyntheticBackend};
pub use traits::{
    CameraConfig, CaptureBackend, CaptureSource, DisplayInfo, FileRecorder, InputEvent, InputKind,
    InputSource, MicrophoneConfig, Rect, Resolution, SelectionTarget, WindowInfo,
};
