//! Windows RDMSR kernel driver
//!
//! The driver image is written to the temp directory, installed as a
//! demand-start kernel service and opened through its device link. Closing
//! the channel stops and deletes the service again.

use std::ffi::c_void;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr;
use std::thread;
use std::time::Duration;

use cs_core::affinity::pin_current_thread;
use cs_error::{CpuidError, Result};
use tracing::{debug, info};
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_IO_PENDING, ERROR_SERVICE_ALREADY_RUNNING, ERROR_SERVICE_EXISTS,
    ERROR_SERVICE_MARKED_FOR_DELETE, GENERIC_READ, GENERIC_WRITE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAG_OVERLAPPED, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Services::{
    CloseServiceHandle, ControlService, CreateServiceW, DeleteService, OpenSCManagerW,
    OpenServiceW, QueryServiceStatus, StartServiceW, SC_HANDLE, SC_MANAGER_ALL_ACCESS,
    SERVICE_ALL_ACCESS, SERVICE_CONTROL_STOP, SERVICE_DEMAND_START, SERVICE_ERROR_NORMAL,
    SERVICE_KERNEL_DRIVER, SERVICE_RUNNING, SERVICE_STATUS, SERVICE_STATUS_CURRENT_STATE,
    SERVICE_STOPPED,
};
use windows::Win32::System::Threading::CreateEventW;
use windows::Win32::System::IO::{CancelIo, DeviceIoControl, GetOverlappedResult, OVERLAPPED};

use crate::channel::{registered_driver_image, ChannelKind, ChannelOptions, Register, RegisterBackend};
use crate::constants::driver::{
    DEVICE_PATH, DISPLAY_NAME, IMAGE_FILE, IOCTL_RDMSR, POLL_MAX_MS, POLL_MIN_MS, SERVICE_NAME,
};

#[derive(Debug)]
struct DriverBackend {
    core: u32,
    service: SC_HANDLE,
    device: HANDLE,
    event: HANDLE,
    open: bool,
}

// SAFETY: the handles are owned exclusively by the backend and the driver
// calls made on them are not tied to the creating thread
unsafe impl Send for DriverBackend {}

fn load_image(options: &ChannelOptions) -> Result<Vec<u8>> {
    if let Some(path) = &options.driver_image {
        return fs::read(path)
            .map_err(|e| CpuidError::Extract(format!("{}: {e}", path.display())));
    }
    registered_driver_image()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| CpuidError::Extract("no driver image available".into()))
}

fn extract_driver(options: &ChannelOptions) -> Result<PathBuf> {
    let image = load_image(options)?;
    let path = std::env::temp_dir().join(IMAGE_FILE);
    fs::write(&path, image).map_err(|e| CpuidError::Extract(format!("{}: {e}", path.display())))?;
    debug!(path = %path.display(), "Extracted driver image");
    Ok(path)
}

fn wait_for_state(service: SC_HANDLE, desired: SERVICE_STATUS_CURRENT_STATE) -> bool {
    loop {
        let mut status = SERVICE_STATUS::default();
        // SAFETY: status is a valid out pointer
        if unsafe { QueryServiceStatus(service, &mut status) }.is_err() {
            return false;
        }
        if status.dwCurrentState == desired {
            return true;
        }
        let wait = (status.dwWaitHint / 10).clamp(POLL_MIN_MS, POLL_MAX_MS);
        thread::sleep(Duration::from_millis(u64::from(wait)));
    }
}

fn remove_service(service: SC_HANDLE) {
    // SAFETY: service is a valid handle owned by the caller
    unsafe {
        if let Err(e) = DeleteService(service) {
            debug!(error = %e, "Delete driver service failed");
        }
        let _ = CloseServiceHandle(service);
    }
}

/// Create (or reuse) the service and make sure it runs
fn install_service(image: &Path) -> Result<SC_HANDLE> {
    let name = HSTRING::from(SERVICE_NAME);
    let display = HSTRING::from(DISPLAY_NAME);
    let binary = HSTRING::from(image.as_os_str());

    // SAFETY: all strings outlive the calls; handles are closed on every path
    unsafe {
        let manager = OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_ALL_ACCESS)
            .map_err(|e| CpuidError::no_driver(format!("open SCM: {e}")))?;

        let created = CreateServiceW(
            manager,
            &name,
            &display,
            SERVICE_ALL_ACCESS,
            SERVICE_KERNEL_DRIVER,
            SERVICE_DEMAND_START,
            SERVICE_ERROR_NORMAL,
            &binary,
            PCWSTR::null(),
            None,
            PCWSTR::null(),
            PCWSTR::null(),
            PCWSTR::null(),
        );
        let service = match created {
            Ok(service) => service,
            Err(e)
                if e.code() == ERROR_SERVICE_EXISTS.to_hresult()
                    || e.code() == ERROR_SERVICE_MARKED_FOR_DELETE.to_hresult() =>
            {
                match OpenServiceW(manager, &name, SERVICE_ALL_ACCESS) {
                    Ok(service) => service,
                    Err(e) => {
                        let _ = CloseServiceHandle(manager);
                        return Err(CpuidError::no_driver(format!("open service: {e}")));
                    }
                }
            }
            Err(e) if e.code() == ERROR_ACCESS_DENIED.to_hresult() => {
                let _ = CloseServiceHandle(manager);
                return Err(CpuidError::NoPerms);
            }
            Err(e) => {
                let _ = CloseServiceHandle(manager);
                return Err(CpuidError::no_driver(format!("create service: {e}")));
            }
        };
        let _ = CloseServiceHandle(manager);

        match StartServiceW(service, None) {
            Ok(()) => {
                if !wait_for_state(service, SERVICE_RUNNING) {
                    remove_service(service);
                    return Err(CpuidError::no_driver("driver did not start"));
                }
                info!(service = SERVICE_NAME, "Driver loaded");
            }
            Err(e) if e.code() == ERROR_SERVICE_ALREADY_RUNNING.to_hresult() => {
                info!(service = SERVICE_NAME, "Driver already running");
            }
            Err(e) => {
                remove_service(service);
                return Err(CpuidError::no_driver(format!("start service: {e}")));
            }
        }
        Ok(service)
    }
}

fn open_device() -> Result<(HANDLE, HANDLE)> {
    // SAFETY: the path string outlives the call
    unsafe {
        let device = CreateFileW(
            &HSTRING::from(DEVICE_PATH),
            (GENERIC_READ | GENERIC_WRITE).0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            FILE_FLAG_OVERLAPPED,
            None,
        )
        .map_err(|e| CpuidError::no_driver(format!("open {DEVICE_PATH}: {e}")))?;

        match CreateEventW(None, true, false, PCWSTR::null()) {
            Ok(event) => Ok((device, event)),
            Err(e) => {
                let _ = CloseHandle(device);
                Err(CpuidError::no_driver(format!("create event: {e}")))
            }
        }
    }
}

pub(crate) fn open(
    core: u32,
    kind: ChannelKind,
    options: &ChannelOptions,
) -> Result<Box<dyn RegisterBackend>> {
    if kind != ChannelKind::Msr {
        return Err(CpuidError::not_implemented("ARM register driver on Windows"));
    }
    let image = extract_driver(options)?;
    let installed = install_service(&image);
    if let Err(e) = fs::remove_file(&image) {
        debug!(error = %e, "Deleting temporary driver file failed");
    }
    let service = installed?;

    match open_device() {
        Ok((device, event)) => Ok(Box::new(DriverBackend {
            core,
            service,
            device,
            event,
            open: true,
        })),
        Err(e) => {
            remove_service(service);
            Err(e)
        }
    }
}

/// Outcome of issuing an overlapped request: done or pending is fine
fn issued(result: windows::core::Result<()>) -> Result<()> {
    match result {
        Err(e) if e.code() != ERROR_IO_PENDING.to_hresult() => {
            Err(CpuidError::HandleRead(e.to_string()))
        }
        _ => Ok(()),
    }
}

impl RegisterBackend for DriverBackend {
    fn read(&mut self, register: Register) -> Result<u64> {
        let Register::Msr(index) = register else {
            return Err(CpuidError::InvalidRequest(register.request()));
        };
        if !self.open {
            return Err(CpuidError::InvalidHandle);
        }
        // The driver executes RDMSR on the core that issues the request
        let _pinned = pin_current_thread(self.core as usize)?;

        let mut value: u64 = 0;
        let mut returned: u32 = 0;
        let mut overlapped = OVERLAPPED {
            hEvent: self.event,
            ..Default::default()
        };
        // SAFETY: buffers and the OVERLAPPED live until GetOverlappedResult
        // has waited for the request to complete
        unsafe {
            issued(DeviceIoControl(
                self.device,
                IOCTL_RDMSR,
                Some(ptr::from_ref(&index).cast::<c_void>()),
                4,
                Some(ptr::from_mut(&mut value).cast::<c_void>()),
                8,
                Some(&mut returned),
                Some(&mut overlapped),
            ))?;
            GetOverlappedResult(self.device, &overlapped, &mut returned, true)
                .map_err(|e| CpuidError::HandleRead(e.to_string()))?;
        }
        if returned != 8 {
            return Err(CpuidError::invalid_msr(index, format!("driver returned {returned} bytes")));
        }
        Ok(value)
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(CpuidError::InvalidHandle);
        }
        self.open = false;

        // SAFETY: every handle is valid and closed exactly once
        unsafe {
            let _ = CancelIo(self.device);
            let _ = CloseHandle(self.event);
            let _ = CloseHandle(self.device);

            let mut status = SERVICE_STATUS::default();
            if ControlService(self.service, SERVICE_CONTROL_STOP, &mut status).is_ok() {
                wait_for_state(self.service, SERVICE_STOPPED);
            }
        }
        remove_service(self.service);
        info!(service = SERVICE_NAME, "Driver unloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_request_is_waited_for() {
        assert!(issued(Ok(())).is_ok());
        let pending = windows::core::Error::from_hresult(ERROR_IO_PENDING.to_hresult());
        assert!(issued(Err(pending)).is_ok());
    }

    #[test]
    fn test_synchronous_failure_is_a_read_error() {
        let denied = windows::core::Error::from_hresult(ERROR_ACCESS_DENIED.to_hresult());
        assert!(matches!(issued(Err(denied)), Err(CpuidError::HandleRead(_))));
    }
}
