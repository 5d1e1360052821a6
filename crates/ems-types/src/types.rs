//! Decoded WiFi scan data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coarse signal bucket derived from an RSSI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SignalQuality {
    /// -85 dBm or weaker.
    Poor,
    /// Between -85 and -75 dBm.
    Fair,
    /// Between -75 and -60 dBm.
    Good,
    /// Stronger than -60 dBm.
    Excellent,
}

impl SignalQuality {
    /// Bucket an RSSI value in dBm.
    ///
    /// # Examples
    ///
    /// ```
    /// use ems_types::SignalQuality;
    ///
    /// assert_eq!(SignalQuality::from_rssi(-42), SignalQuality::Excellent);
    /// assert_eq!(SignalQuality::from_rssi(-60), SignalQuality::Good);
    /// assert_eq!(SignalQuality::from_rssi(-90), SignalQuality::Poor);
    /// ```
    #[must_use]
    pub fn from_rssi(rssi: i16) -> Self {
        if rssi > -60 {
            SignalQuality::Excellent
        } else if rssi > -75 {
            SignalQuality::Good
        } else if rssi > -85 {
            SignalQuality::Fair
        } else {
            SignalQuality::Poor
        }
    }

    /// Number of filled bars out of four.
    #[must_use]
    pub fn bars(self) -> u8 {
        match self {
            SignalQuality::Poor => 1,
            SignalQuality::Fair => 2,
            SignalQuality::Good => 3,
            SignalQuality::Excellent => 4,
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalQuality::Poor => "poor",
            SignalQuality::Fair => "fair",
            SignalQuality::Good => "good",
            SignalQuality::Excellent => "excellent",
        };
        f.write_str(s)
    }
}

/// One network seen by the device during its last WiFi scan.
///
/// The SSID may be empty (hidden networks) but is always present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkRecord {
    ssid: String,
    rssi: i16,
}

impl NetworkRecord {
    /// Create a record.
    pub fn new(ssid: impl Into<String>, rssi: i16) -> Self {
        Self {
            ssid: ssid.into(),
            rssi,
        }
    }

    /// Network name as reported by the device.
    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Signal strength in dBm.
    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// Whether the network hides its SSID.
    pub fn is_hidden(&self) -> bool {
        self.ssid.is_empty()
    }

    /// Signal bucket for display.
    pub fn signal_quality(&self) -> SignalQuality {
        SignalQuality::from_rssi(self.rssi)
    }
}

impl fmt::Display for NetworkRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dBm)", self.ssid, self.rssi)
    }
}

/// Ordered list of networks, in the order the device reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanResult {
    networks: Vec<NetworkRecord>,
}

impl ScanResult {
    /// Wrap records without reordering them.
    pub fn new(networks: Vec<NetworkRecord>) -> Self {
        Self { networks }
    }

    pub fn networks(&self) -> &[NetworkRecord] {
        &self.networks
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NetworkRecord> {
        self.networks.iter()
    }

    /// Strongest network, if any. Ties go to the one reported first.
    pub fn strongest(&self) -> Option<&NetworkRecord> {
        self.networks
            .iter()
            .reduce(|best, n| if n.rssi > best.rssi { n } else { best })
    }

    pub fn into_networks(self) -> Vec<NetworkRecord> {
        self.networks
    }
}

impl IntoIterator for ScanResult {
    type Item = NetworkRecord;
    type IntoIter = std::vec::IntoIter<NetworkRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.networks.into_iter()
    }
}

impl<'a> IntoIterator for &'a ScanResult {
    type Item = &'a NetworkRecord;
    type IntoIter = std::slice::Iter<'a, NetworkRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.networks.iter()
    }
}

impl FromIterator<NetworkRecord> for ScanResult {
    fn from_iter<I: IntoIterator<Item = NetworkRecord>>(iter: I) -> Self {
        Self {
            networks: iter.into_iter().collect(),
        }
    }
}
