//! nl80211 value types, driver capability snapshots and scan settings.

use std::fmt;

use bytes::Bytes;

use super::{Nl80211Attr, Nl80211BssAttr, Nl80211Iftype, WLAN_EID_SSID};
use crate::netlink::attr::{AttrValue, AttributeView, find};
use crate::netlink::error::{Error, Result};

/// 6-byte hardware address (station MAC or BSSID).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Create from raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Check for the locally administered bit (randomized addresses).
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl AttrValue for MacAddr {
    fn from_attr(kind: u16, payload: &Bytes) -> Result<Self> {
        <[u8; 6]>::from_attr(kind, payload).map(Self)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MacAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Operating mode an interface can be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum InterfaceMode {
    /// Client (managed) mode.
    Station,
    /// Access point mode.
    Ap,
}

impl InterfaceMode {
    /// Value sent in `NL80211_ATTR_IFTYPE`.
    pub fn iftype(self) -> Nl80211Iftype {
        match self {
            Self::Station => Nl80211Iftype::Station,
            Self::Ap => Nl80211Iftype::Ap,
        }
    }
}

/// Channel frequencies (MHz) the driver reported, per band.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BandInfo {
    /// 2.4 GHz channels.
    pub band_2g: Vec<u32>,
    /// 5 GHz channels that do not require radar detection.
    pub band_5g: Vec<u32>,
    /// 5 GHz DFS channels.
    pub band_dfs: Vec<u32>,
}

/// Scan limits reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanCapabilities {
    /// Max SSIDs in a single scan request.
    pub max_num_scan_ssids: u8,
    /// Max SSIDs in a scheduled scan request.
    pub max_num_sched_scan_ssids: u8,
    /// Max match sets in a scheduled scan request.
    pub max_match_sets: u8,
}

/// Driver feature bits relevant to scanning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WiphyFeatures {
    /// Driver can randomize the MAC for one-shot scans.
    pub supports_random_mac_oneshot_scan: bool,
    /// Driver can randomize the MAC for scheduled scans.
    pub supports_random_mac_sched_scan: bool,
}

/// One BSS from a `GET_SCAN` dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanResult {
    /// Interface the result was reported on.
    pub interface_index: u32,
    /// BSSID of the access point.
    pub bssid: MacAddr,
    /// SSID bytes from the SSID information element (may not be UTF-8).
    pub ssid: Vec<u8>,
    /// Center frequency in MHz.
    pub frequency: u32,
    /// Signal strength in mBm (dBm * 100).
    pub signal_mbm: i32,
    /// Timing synchronization function value.
    pub tsf: u64,
    /// Capability field of the beacon or scan response frame.
    pub capability: u16,
    /// Age of the result in milliseconds.
    pub seen_ms_ago: Option<u32>,
    /// Whether we are associated to this BSS.
    pub associated: bool,
    /// Raw information elements.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub information_elements: Vec<u8>,
}

impl ScanResult {
    /// Parse one `NEW_SCAN_RESULTS` dump entry.
    ///
    /// `attrs` are the top-level attributes of the message. Returns an
    /// error if the BSS nest, BSSID or frequency is missing or malformed.
    pub fn from_attrs(attrs: &[AttributeView]) -> Result<Self> {
        let interface_index = find(attrs, Nl80211Attr::Ifindex as u16)
            .map(|a| a.value())
            .transpose()?
            .unwrap_or(0);
        let bss = find(attrs, Nl80211Attr::Bss as u16).ok_or(Error::MissingAttribute {
            name: Nl80211Attr::Bss.name(),
        })?;

        let mut result = ScanResult {
            interface_index,
            ..Default::default()
        };
        let mut bssid = None;
        let mut frequency = None;

        for attr in bss.nested()? {
            match attr.kind() {
                t if t == Nl80211BssAttr::Bssid as u16 => bssid = Some(attr.value()?),
                t if t == Nl80211BssAttr::Frequency as u16 => frequency = Some(attr.value()?),
                t if t == Nl80211BssAttr::Tsf as u16 => result.tsf = attr.value()?,
                t if t == Nl80211BssAttr::Capability as u16 => {
                    result.capability = attr.value()?
                }
                t if t == Nl80211BssAttr::InformationElements as u16 => {
                    result.information_elements = attr.value()?
                }
                t if t == Nl80211BssAttr::SignalMbm as u16 => result.signal_mbm = attr.value()?,
                t if t == Nl80211BssAttr::SeenMsAgo as u16 => {
                    result.seen_ms_ago = Some(attr.value()?)
                }
                t if t == Nl80211BssAttr::Status as u16 => {
                    // Any status (authenticated, associated, IBSS joined) means
                    // this BSS is ours.
                    result.associated = true
                }
                _ => {}
            }
        }

        result.bssid = bssid.ok_or(Error::MissingAttribute {
            name: "NL80211_BSS_BSSID",
        })?;
        result.frequency = frequency.ok_or(Error::MissingAttribute {
            name: "NL80211_BSS_FREQUENCY",
        })?;
        result.ssid = ssid_from_ies(&result.information_elements)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        Ok(result)
    }

    /// SSID as text, with invalid UTF-8 replaced.
    pub fn ssid_lossy(&self) -> String {
        String::from_utf8_lossy(&self.ssid).into_owned()
    }
}

/// Find the SSID element in an information element blob.
///
/// Stops at the first element whose length overruns the blob.
pub fn ssid_from_ies(ies: &[u8]) -> Option<&[u8]> {
    let mut rest = ies;
    while rest.len() >= 2 {
        let (id, len) = (rest[0], rest[1] as usize);
        let body = rest.get(2..2 + len)?;
        if id == WLAN_EID_SSID {
            return Some(body);
        }
        rest = &rest[2 + len..];
    }
    None
}

/// Settings for a one-shot scan.
///
/// # Example
///
/// ```
/// use wificond::nl80211::ScanSettings;
///
/// let settings = ScanSettings::new()
///     .frequency(2412)
///     .frequency(5180)
///     .hidden_ssid(b"office".to_vec());
/// assert_eq!(settings.frequencies, vec![2412, 5180]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSettings {
    /// Frequencies to scan, in MHz. Empty means all supported channels.
    pub frequencies: Vec<u32>,
    /// SSIDs of hidden networks to scan for explicitly.
    pub hidden_ssids: Vec<Vec<u8>>,
}

impl ScanSettings {
    /// Create empty settings (all channels, wildcard SSID only).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a frequency to scan.
    pub fn frequency(mut self, mhz: u32) -> Self {
        self.frequencies.push(mhz);
        self
    }

    /// Add a hidden network SSID to scan for.
    pub fn hidden_ssid(mut self, ssid: impl Into<Vec<u8>>) -> Self {
        self.hidden_ssids.push(ssid.into());
        self
    }
}

/// A network to look for during a scheduled (PNO) scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnoNetwork {
    /// Network SSID.
    pub ssid: Vec<u8>,
    /// Whether the network hides its SSID and must be scanned for by name.
    pub hidden: bool,
}

/// Settings for a scheduled (PNO) scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnoSettings {
    /// Interval between scans in milliseconds.
    pub interval_ms: u32,
    /// RSSI threshold for 2.4 GHz matches, in dBm.
    pub min_2g_rssi: i32,
    /// RSSI threshold for 5 GHz matches, in dBm.
    pub min_5g_rssi: i32,
    /// Networks to match.
    pub networks: Vec<PnoNetwork>,
}

impl Default for PnoSettings {
    fn default() -> Self {
        Self {
            interval_ms: 20_000,
            min_2g_rssi: -80,
            min_5g_rssi: -77,
            networks: Vec::new(),
        }
    }
}

impl PnoSettings {
    /// Create settings with default interval and thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan interval.
    pub fn interval_ms(mut self, interval_ms: u32) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    /// Set the 2.4 GHz RSSI threshold.
    pub fn min_2g_rssi(mut self, dbm: i32) -> Self {
        self.min_2g_rssi = dbm;
        self
    }

    /// Set the 5 GHz RSSI threshold.
    pub fn min_5g_rssi(mut self, dbm: i32) -> Self {
        self.min_5g_rssi = dbm;
        self
    }

    /// Add a network to match.
    pub fn network(mut self, ssid: impl Into<Vec<u8>>, hidden: bool) -> Self {
        self.networks.push(PnoNetwork {
            ssid: ssid.into(),
            hidden,
        });
        self
    }
}

/// Parameters of an `NL80211_CMD_TRIGGER_SCAN` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// Randomize the scan request source address.
    pub random_mac: bool,
    /// SSIDs to scan for; an empty SSID is the wildcard.
    pub ssids: Vec<Vec<u8>>,
    /// Frequencies in MHz; empty means all.
    pub frequencies: Vec<u32>,
}

/// Parameters of an `NL80211_CMD_START_SCHED_SCAN` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduledScanRequest {
    /// Interval between scans in milliseconds.
    pub interval_ms: u32,
    /// Minimum RSSI (dBm) for a match to be reported.
    pub rssi_threshold: i32,
    /// Randomize the scan request source address.
    pub random_mac: bool,
    /// SSIDs to scan for; an empty SSID is the wildcard.
    pub scan_ssids: Vec<Vec<u8>>,
    /// SSIDs that trigger a results notification.
    pub match_ssids: Vec<Vec<u8>>,
    /// Frequencies in MHz; empty means all.
    pub frequencies: Vec<u32>,
}
