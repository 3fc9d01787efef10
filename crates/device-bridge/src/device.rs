//! Device Types and State
//!
//! Devices as reported by `adb devices -l`.

use serde::{Deserialize, Serialize};

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Device is online and ready
    Online,
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    Unknown,
}

impl DeviceState {
    pub fn from_adb(state: &str) -> Self {
        match state {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            _ => DeviceState::Unknown,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, DeviceState::Online)
    }
}

/// Device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    /// Device model (e.g., "Pixel_4")
    pub model: Option<String>,
}

impl Device {
    pub fn is_usable(&self) -> bool {
        self.state.is_usable()
    }

    pub fn is_emulator(&self) -> bool {
        self.serial.starts_with("emulator-")
    }

    pub fn display_name(&self) -> String {
        if let Some(ref model) = self.model {
            format!("{} ({})", model.replace('_', " "), self.serial)
        } else {
            self.serial.clone()
        }
    }
}

/// Parse `adb devices -l` output
pub fn parse_device_list(output: &str) -> Vec<Device> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                return None;
            }
            let model = parts
                .iter()
                .skip(2)
                .find_map(|part| part.strip_prefix("model:"))
                .map(str::to_string);
            Some(Device {
                serial: parts[0].to_string(),
                state: DeviceState::from_adb(parts[1]),
                model,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_list() {
        let output = "* daemon started successfully\n\
                      List of devices attached\n\
                      emulator-5554          device product:sdk_gphone model:Pixel_4 transport_id:1\n\
                      R58M123ABC             unauthorized usb:1-1 transport_id:2\n\n";
        let devices = parse_device_list(output);
        assert_eq!(devices.len(), 2);
        assert!(devices[0].is_usable());
        assert!(devices[0].is_emulator());
        assert_eq!(devices[0].display_name(), "Pixel 4 (emulator-5554)");
        assert_eq!(devices[1].state, DeviceState::Unauthorized);
        assert_eq!(devices[1].display_name(), "R58M123ABC");
    }

    #[test]
    fn test_empty_list() {
        assert!(parse_device_list("List of devices attached\n\n").is_empty());
    }
}
