//! Output device enumeration and lookup
//!
//! Devices are enumerated from every available host (JACK, ALSA, PipeWire...)
//! so a config can name a device on a non-default host.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Display name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An output device as seen at startup
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Default device for its host
    pub is_default: bool,
    pub max_channels: u16,
}

/// All output devices from all hosts, default devices first
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Audio: could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Audio: could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices {
            let Ok(name) = device.name() else { continue };
            let Ok(configs) = device.supported_output_configs() else { continue };
            let max_channels = configs.map(|c| c.channels()).max().unwrap_or(0);
            if max_channels == 0 {
                continue;
            }

            all_devices.push(AudioDevice {
                is_default: default_name.as_ref() == Some(&name),
                id: DeviceId::with_host(&name, &host_label),
                host: host_label.clone(),
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.id.name.cmp(&b.id.name))
    });
    Ok(all_devices)
}

/// Find a device by its ID
///
/// Uses the ID's host when given, otherwise searches every host by name.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(|d| d.name().ok().as_ref() == Some(&id.name))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else { continue };
        let Ok(mut devices) = host.output_devices() else { continue };
        if let Some(device) = devices.find(|d| d.name().ok().as_ref() == Some(&id.name)) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Default output device of the default host
pub fn get_cpal_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_names() {
        for host_id in cpal::available_hosts() {
            assert!(!host_name(host_id).is_empty());
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::new("crowdmix-no-such-device");
        assert!(matches!(find_device_by_id(&id), Err(AudioError::DeviceNotFound(_))));
    }

    #[test]
    fn test_device_enumeration() {
        // Headless CI has no devices
        match get_output_devices() {
            Ok(devices) => assert!(devices.iter().all(|d| d.max_channels > 0)),
            Err(AudioError::NoDevices) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
