use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, StreamConfig};
use voxstream_foundation::AudioError;

/// Input device enumeration and selection.
pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        Ok(Self { host })
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    pub fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                if let Ok(name) = device.name() {
                    let configs = self.get_supported_configs(&device);
                    if !configs.is_empty() {
                        devices.push(DeviceInfo {
                            name: name.clone(),
                            is_default: false,
                            supported_configs: configs,
                        });
                    }
                }
            }
        }

        // Mark default
        if let Some(default) = self.host.default_input_device() {
            if let Ok(default_name) = default.name() {
                for device in &mut devices {
                    if device.name == default_name {
                        device.is_default = true;
                    }
                }
            }
        }

        devices
    }

    pub fn default_input_device_name(&self) -> Option<String> {
        self.host.default_input_device().and_then(|d| d.name().ok())
    }

    /// Candidate device names in priority order for Linux ALSA/PipeWire
    /// setups: "default" shim -> "pipewire" -> OS default -> the rest.
    pub fn candidate_device_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let all = self.enumerate_devices();

        if all.iter().any(|d| d.name == "default") {
            out.push("default".to_string());
        }

        if !out.iter().any(|n| n == "pipewire") && all.iter().any(|d| d.name == "pipewire") {
            out.push("pipewire".to_string());
        }

        if let Some(def) = self.default_input_device_name() {
            if !out.iter().any(|n| n == &def) {
                out.push(def);
            }
        }

        for d in all {
            if !out.iter().any(|n| n == &d.name) {
                out.push(d.name);
            }
        }

        out
    }

    pub fn open_device(&self, name: Option<&str>) -> Result<Device, AudioError> {
        // A specific name is tried exactly, then as a case-insensitive
        // substring; no silent fallback when the user asked for a device.
        if let Some(preferred) = name {
            if let Some(device) = self.find_device_by_name(preferred) {
                return Ok(device);
            }
            if let Some(device) = self
                .find_device_by_predicate(|n| n.to_lowercase().contains(&preferred.to_lowercase()))
            {
                tracing::warn!(
                    "Preferred device '{}' not found exactly; using closest match '{}'",
                    preferred,
                    device.name().unwrap_or_default()
                );
                return Ok(device);
            }
            return Err(AudioError::DeviceNotFound {
                name: Some(preferred.to_string()),
            });
        }

        for candidate in self.candidate_device_names() {
            if let Some(device) = self.find_device_by_name(&candidate) {
                return Ok(device);
            }
        }

        self.host
            .default_input_device()
            .ok_or(AudioError::DeviceNotFound { name: None })
    }

    fn find_device_by_name(&self, name: &str) -> Option<Device> {
        if let Ok(devices) = self.host.input_devices() {
            for device in devices {
                if let Ok(device_name) = device.name() {
                    if device_name == name {
                        return Some(device);
                    }
                }
            }
        }
        None
    }

    fn find_device_by_predicate<F>(&self, pred: F) -> Option<Device>
    where
        F: Fn(&str) -> bool,
    {
        if let Ok(devices) = self.host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name() {
                    if pred(&name) {
                        return Some(device);
                    }
                }
            }
        }
        None
    }

    fn get_supported_configs(&self, device: &Device) -> Vec<StreamConfig> {
        let mut configs = Vec::new();

        if let Ok(supported) = device.supported_input_configs() {
            for config in supported {
                configs.push(StreamConfig {
                    channels: config.channels(),
                    sample_rate: config.max_sample_rate(),
                    buffer_size: cpal::BufferSize::Default,
                });
            }
        }

        configs
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub supported_configs: Vec<StreamConfig>,
}
