//! CL3IF vendor-library binding
//!
//! The CL-3000 communication SDK ships as a vendor shared library
//! (`CL3IF.dll` on Windows, `libcl3if.so` on Linux gateways). There is no
//! Rust crate for it, so the library is loaded at runtime with
//! `libloading` and the handful of entry points the monitor needs are
//! bound as typed symbols. Struct layouts follow the vendor headers.
//!
//! All calls return a vendor status code; zero means success. Non-zero
//! codes are surfaced unchanged inside [`DeviceError`] so they can be
//! logged in the vendor's hex notation.

use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use libloading::{Library, Symbol};
use std::os::raw::{c_int, c_ushort};

use super::device::{MeasurementDevice, MeasurementFrame, RawChannelData};
use crate::types::MAX_CHANNELS;

/// Ethernet connection parameters, laid out as the vendor header defines.
/// Fields are read by the foreign library, not by Rust code.
#[repr(C)]
#[allow(dead_code)]
struct Cl3IfEthernetSetting {
    ip_address: [u8; 4],
    port_no: c_ushort,
    _reserved: [u8; 2],
}

/// Raw per-OUT measurement result, laid out as the vendor header defines.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Cl3IfOutMeasurementData {
    measurement_value: c_int,
    value_info: u8,
    judge_result: u8,
    _reserved: [u8; 2],
}

/// One measurement frame covering all OUT channels.
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Cl3IfMeasurementData {
    out_measurement_data: [Cl3IfOutMeasurementData; MAX_CHANNELS],
}

type FnOpenEthernet =
    unsafe extern "C" fn(c_int, *const Cl3IfEthernetSetting, c_int) -> c_int;
type FnGetMeasurementData = unsafe extern "C" fn(c_int, *mut Cl3IfMeasurementData) -> c_int;
type FnResetGroup = unsafe extern "C" fn(c_int, c_ushort) -> c_int;
/// Close/ClearStorageData/StartStorage/StopStorage all share this shape.
type FnDeviceOnly = unsafe extern "C" fn(c_int) -> c_int;

/// Candidate library names, tried in order.
#[cfg(windows)]
const LIBRARY_CANDIDATES: &[&str] = &["CL3IF.dll", "C:\\Keyence\\CL3000\\CL3IF.dll"];
#[cfg(not(windows))]
const LIBRARY_CANDIDATES: &[&str] = &["libcl3if.so", "/usr/local/lib/libcl3if.so"];

/// Loaded CL3IF library with symbol lookup helpers.
struct Cl3Library {
    lib: Library,
}

impl Cl3Library {
    fn load() -> DeviceResult<Self> {
        let mut last_error = None;
        for name in LIBRARY_CANDIDATES {
            // Loading a foreign library runs its initializers
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    tracing::info!("Loaded CL3IF library from {}", name);
                    return Ok(Self { lib });
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(DeviceError::Sdk(format!(
            "failed to load CL3IF library (tried {:?}): {}",
            LIBRARY_CANDIDATES,
            last_error.map_or_else(|| "no candidates".to_string(), |e| e.to_string())
        )))
    }

    fn symbol<'a, T>(&'a self, name: &[u8]) -> DeviceResult<Symbol<'a, T>> {
        unsafe { self.lib.get(name) }.map_err(|e| {
            DeviceError::Sdk(format!(
                "missing CL3IF entry point {}: {}",
                String::from_utf8_lossy(name),
                e
            ))
        })
    }
}

/// Vendor-SDK-backed measurement device.
pub struct Cl3Device {
    library: Option<Cl3Library>,
    device_id: i32,
    open: bool,
}

impl Cl3Device {
    /// Create an unopened device handle. The vendor library is loaded on
    /// the first `open` so the application can start without it installed.
    pub fn new() -> Self {
        Self {
            library: None,
            device_id: 0,
            open: false,
        }
    }

    fn library(&mut self) -> DeviceResult<&Cl3Library> {
        if self.library.is_none() {
            self.library = Some(Cl3Library::load()?);
        }
        self.library
            .as_ref()
            .ok_or_else(|| DeviceError::Sdk("CL3IF library unavailable".to_string()))
    }

    fn status_call(&mut self, name: &[u8]) -> DeviceResult<()> {
        let device_id = self.device_id;
        let library = self.library()?;
        let func: Symbol<FnDeviceOnly> = library.symbol(name)?;
        let status = unsafe { func(device_id) };
        if status != 0 {
            return Err(DeviceError::Read { status });
        }
        Ok(())
    }
}

impl Default for Cl3Device {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementDevice for Cl3Device {
    fn open(&mut self, config: &DeviceConfig) -> DeviceResult<()> {
        if self.open {
            return Ok(());
        }
        self.device_id = config.device_id;
        let setting = Cl3IfEthernetSetting {
            ip_address: config.ip_address,
            port_no: config.port,
            _reserved: [0; 2],
        };
        let timeout = config.connect_timeout_ms as c_int;
        let device_id = self.device_id;
        let library = self.library()?;
        let func: Symbol<FnOpenEthernet> =
            library.symbol(b"CL3IF_OpenEthernetCommunication")?;
        let status = unsafe { func(device_id, &setting, timeout) };
        if status != 0 {
            return Err(DeviceError::Connection { status });
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Some(library) = &self.library {
            if let Ok(func) = library.symbol::<FnDeviceOnly>(b"CL3IF_CloseCommunication") {
                let status = unsafe { func(self.device_id) };
                if status != 0 {
                    tracing::warn!("CL3IF_CloseCommunication returned 0x{:08X}", status);
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_frame(&mut self) -> DeviceResult<MeasurementFrame> {
        let device_id = self.device_id;
        let library = self.library()?;
        let func: Symbol<FnGetMeasurementData> =
            library.symbol(b"CL3IF_GetMeasurementData")?;
        let mut data = Cl3IfMeasurementData::default();
        let status = unsafe { func(device_id, &mut data) };
        if status != 0 {
            return Err(DeviceError::Read { status });
        }

        let mut frame = MeasurementFrame::default();
        for (slot, out) in frame.channels.iter_mut().zip(data.out_measurement_data) {
            *slot = RawChannelData {
                raw_value: out.measurement_value,
                value_info: out.value_info,
                judge_bits: out.judge_result,
            };
        }
        Ok(frame)
    }

    fn clear_storage(&mut self) -> DeviceResult<()> {
        self.status_call(b"CL3IF_ClearStorageData")
    }

    fn start_storage(&mut self) -> DeviceResult<()> {
        self.status_call(b"CL3IF_StartStorage")
    }

    fn stop_storage(&mut self) -> DeviceResult<()> {
        self.status_call(b"CL3IF_StopStorage")
    }

    fn reset_group(&mut self, group: u16) -> DeviceResult<()> {
        let device_id = self.device_id;
        let library = self.library()?;
        let func: Symbol<FnResetGroup> = library.symbol(b"CL3IF_ResetGroup")?;
        let status = unsafe { func(device_id, group) };
        if status != 0 {
            return Err(DeviceError::Read { status });
        }
        Ok(())
    }
}

impl Drop for Cl3Device {
    fn drop(&mut self) {
        self.close();
    }
}
