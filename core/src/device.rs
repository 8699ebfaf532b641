//! Output device description, ranking and route selection
//!
//! Backends enumerate devices into [`OutputDevice`] values; everything in
//! this module is pure over those values so selection can be tested
//! without audio hardware.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ROUTE_PLACEHOLDER;

/// Category of a physical output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Speaker,
    UsbHeadset,
    UsbDevice,
    BluetoothA2dp,
    WiredHeadphones,
    Hdmi,
    Dock,
    Other,
}

impl DeviceKind {
    /// Short human-readable category label
    pub fn label(self) -> &'static str {
        match self {
            DeviceKind::Speaker => "Speaker",
            DeviceKind::UsbHeadset => "USB headset",
            DeviceKind::UsbDevice => "USB device",
            DeviceKind::BluetoothA2dp => "Bluetooth A2DP",
            DeviceKind::WiredHeadphones => "Wired headphones",
            DeviceKind::Hdmi => "HDMI",
            DeviceKind::Dock => "Dock",
            DeviceKind::Other => "Other",
        }
    }

    pub fn is_usb(self) -> bool {
        matches!(self, DeviceKind::UsbHeadset | DeviceKind::UsbDevice)
    }

    /// Best-effort category from a backend device name
    ///
    /// Desktop audio APIs only expose a name, so the category is inferred
    /// from well-known substrings.
    pub fn classify(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| name.contains(n));

        if has(&["usb"]) {
            if has(&["headset", "headphone"]) {
                DeviceKind::UsbHeadset
            } else {
                DeviceKind::UsbDevice
            }
        } else if has(&["bluetooth", "a2dp", "bluez", "airpods"]) {
            DeviceKind::BluetoothA2dp
        } else if has(&["hdmi", "displayport"]) {
            DeviceKind::Hdmi
        } else if has(&["dock"]) {
            DeviceKind::Dock
        } else if has(&["headphone", "headset", "line out", "lineout"]) {
            DeviceKind::WiredHeadphones
        } else if has(&["speaker", "built-in", "builtin", "internal"]) {
            DeviceKind::Speaker
        } else {
            DeviceKind::Other
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An output device as enumerated by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDevice {
    /// Backend identifier used to reopen the device
    pub id: String,
    pub product_name: Option<String>,
    pub kind: DeviceKind,
    pub is_default: bool,
}

impl OutputDevice {
    /// Describe a device from its backend name alone
    pub fn from_name(name: &str, is_default: bool) -> Self {
        Self {
            id: name.to_string(),
            product_name: Some(name.to_string()).filter(|n| !n.trim().is_empty()),
            kind: DeviceKind::classify(name),
            is_default,
        }
    }

    pub fn route(&self) -> RouteDescriptor {
        RouteDescriptor {
            kind: self.kind,
            product_name: self.product_name.clone(),
        }
    }
}

/// Human-readable identity of the device a stream is actually bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub kind: DeviceKind,
    pub product_name: Option<String>,
}

impl RouteDescriptor {
    pub fn label(&self) -> String {
        match &self.product_name {
            Some(name) => format!("{} ({})", self.kind.label(), name),
            None => self.kind.label().to_string(),
        }
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Routes reported to the observer. `None` means absent or unresolvable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteReport {
    pub primary: Option<RouteDescriptor>,
    pub secondary: Option<RouteDescriptor>,
}

impl RouteReport {
    pub fn primary_label(&self) -> String {
        label_or_placeholder(self.primary.as_ref())
    }

    pub fn secondary_label(&self) -> String {
        label_or_placeholder(self.secondary.as_ref())
    }
}

fn label_or_placeholder(route: Option<&RouteDescriptor>) -> String {
    route
        .map(RouteDescriptor::label)
        .unwrap_or_else(|| ROUTE_PLACEHOLDER.to_string())
}

/// What a route is being selected for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePreference {
    /// Data output: USB first, then the system default
    Primary,
    /// Monitor output: built-in speaker first
    Monitor,
}

fn score(device: &OutputDevice, preference: RoutePreference) -> u8 {
    match preference {
        RoutePreference::Primary => match (device.kind.is_usb(), device.is_default) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        },
        RoutePreference::Monitor => match device.kind {
            DeviceKind::Speaker => 0,
            _ if device.is_default => 1,
            DeviceKind::WiredHeadphones => 2,
            DeviceKind::BluetoothA2dp => 3,
            _ => 4,
        },
    }
}

/// Devices ordered best-first for `preference`; ties keep enumeration order
pub fn rank_devices(devices: &[OutputDevice], preference: RoutePreference) -> Vec<&OutputDevice> {
    let mut ranked: Vec<&OutputDevice> = devices.iter().collect();
    ranked.sort_by_key(|d| score(d, preference));
    ranked
}

/// Selected targets for one playback session
///
/// A `None` primary means "best available": the backend opens its default
/// output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteSelection {
    pub primary: Option<OutputDevice>,
    pub secondary: Option<OutputDevice>,
}

/// Pick the primary and, when mirroring, a distinct secondary target
///
/// Mirroring is skipped silently when no device distinct from the primary
/// exists.
pub fn select_routes(devices: &[OutputDevice], mirror: bool) -> RouteSelection {
    let primary = rank_devices(devices, RoutePreference::Primary)
        .into_iter()
        .next()
        .cloned();

    let secondary = if mirror {
        // Without an enumerated primary the default output is used, so it
        // cannot serve as the monitor.
        rank_devices(devices, RoutePreference::Monitor)
            .into_iter()
            .find(|d| match &primary {
                Some(p) => d.id != p.id,
                None => !d.is_default,
            })
            .cloned()
    } else {
        None
    };

    RouteSelection { primary, secondary }
}
