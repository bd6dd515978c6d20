//! nl80211 packets, decoded events and the kernel command connection.
//!
//! nl80211 is the Generic Netlink family the kernel uses for 802.11
//! configuration. Inbound messages are parsed into a [`Packet`] and turned
//! into typed events by [`EventDecoder`]:
//!
//! ```text
//! bytes ──► Packet::decode ──► EventDecoder::decode ──► Nl80211Event
//!                                                        ├─ Mlme(MlmeEvent)
//!                                                        ├─ Scan(ScanEvent)
//!                                                        ├─ Station(StationEvent)
//!                                                        └─ InterfaceRemoved
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use wificond::nl80211::{EventDecoder, Nl80211EventSocket};
//!
//! # async fn example() -> wificond::Result<()> {
//! let mut events = Nl80211EventSocket::new().await?;
//! loop {
//!     for packet in events.recv_packets().await? {
//!         if let Some(event) = EventDecoder::decode(&packet) {
//!             println!("{:?}", event);
//!         }
//!     }
//! }
//! # }
//! ```

mod connection;
mod event;
mod mlme;
mod packet;
mod scan;
mod station;
mod types;

pub use connection::{Nl80211Connection, Nl80211EventSocket};
pub use event::{EventDecoder, Nl80211Event};
pub use mlme::{
    AssociateEvent, ConnectEvent, DisassociateEvent, DisconnectEvent, MlmeEvent, RoamEvent,
};
pub use packet::Packet;
pub use scan::{ScanEvent, ScanKind};
pub use station::{StationEvent, StationEventKind};
pub use types::{
    BandInfo, InterfaceMode, MacAddr, PnoNetwork, PnoSettings, ScanCapabilities, ScanRequest,
    ScanResult, ScanSettings, ScheduledScanRequest, WiphyFeatures, ssid_from_ies,
};

/// Generic Netlink family name.
pub const NL80211_GENL_NAME: &str = "nl80211";

/// Family version sent in request headers.
pub const NL80211_GENL_VERSION: u8 = 1;

/// Multicast group carrying association and connection events.
pub const NL80211_MULTICAST_GROUP_MLME: &str = "mlme";
/// Multicast group carrying scan completion events.
pub const NL80211_MULTICAST_GROUP_SCAN: &str = "scan";
/// Multicast group carrying interface creation and removal.
pub const NL80211_MULTICAST_GROUP_CONFIG: &str = "config";

/// nl80211 commands.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nl80211Cmd {
    Unspec = 0,
    GetWiphy = 1,
    GetInterface = 5,
    SetInterface = 6,
    NewInterface = 7,
    DelInterface = 8,
    StartAp = 15,
    StopAp = 16,
    GetStation = 17,
    NewStation = 19,
    DelStation = 20,
    GetScan = 32,
    TriggerScan = 33,
    NewScanResults = 34,
    ScanAborted = 35,
    RegChange = 36,
    Authenticate = 37,
    Associate = 38,
    Deauthenticate = 39,
    Disassociate = 40,
    Connect = 46,
    Roam = 47,
    Disconnect = 48,
    StartSchedScan = 75,
    StopSchedScan = 76,
    SchedScanResults = 77,
    SchedScanStopped = 78,
}

impl Nl80211Cmd {
    /// Map a raw command code to a known command.
    pub fn from_u8(cmd: u8) -> Option<Self> {
        Some(match cmd {
            0 => Self::Unspec,
            1 => Self::GetWiphy,
            5 => Self::GetInterface,
            6 => Self::SetInterface,
            7 => Self::NewInterface,
            8 => Self::DelInterface,
            15 => Self::StartAp,
            16 => Self::StopAp,
            17 => Self::GetStation,
            19 => Self::NewStation,
            20 => Self::DelStation,
            32 => Self::GetScan,
            33 => Self::TriggerScan,
            34 => Self::NewScanResults,
            35 => Self::ScanAborted,
            36 => Self::RegChange,
            37 => Self::Authenticate,
            38 => Self::Associate,
            39 => Self::Deauthenticate,
            40 => Self::Disassociate,
            46 => Self::Connect,
            47 => Self::Roam,
            48 => Self::Disconnect,
            75 => Self::StartSchedScan,
            76 => Self::StopSchedScan,
            77 => Self::SchedScanResults,
            78 => Self::SchedScanStopped,
            _ => return None,
        })
    }
}

/// nl80211 top-level attributes.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nl80211Attr {
    Unspec = 0,
    Wiphy = 1,
    WiphyName = 2,
    Ifindex = 3,
    Ifname = 4,
    Iftype = 5,
    Mac = 6,
    StaInfo = 21,
    ScanFrequencies = 44,
    ScanSsids = 45,
    Generation = 46,
    Bss = 47,
    Frame = 51,
    Ssid = 52,
    ReasonCode = 54,
    TimedOut = 65,
    DisconnectedByAp = 71,
    StatusCode = 72,
    ReqIe = 77,
    RespIe = 78,
    SchedScanInterval = 119,
    SchedScanMatch = 132,
    ScanFlags = 158,
}

impl Nl80211Attr {
    /// Kernel header name, used in log and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unspec => "NL80211_ATTR_UNSPEC",
            Self::Wiphy => "NL80211_ATTR_WIPHY",
            Self::WiphyName => "NL80211_ATTR_WIPHY_NAME",
            Self::Ifindex => "NL80211_ATTR_IFINDEX",
            Self::Ifname => "NL80211_ATTR_IFNAME",
            Self::Iftype => "NL80211_ATTR_IFTYPE",
            Self::Mac => "NL80211_ATTR_MAC",
            Self::StaInfo => "NL80211_ATTR_STA_INFO",
            Self::ScanFrequencies => "NL80211_ATTR_SCAN_FREQUENCIES",
            Self::ScanSsids => "NL80211_ATTR_SCAN_SSIDS",
            Self::Generation => "NL80211_ATTR_GENERATION",
            Self::Bss => "NL80211_ATTR_BSS",
            Self::Frame => "NL80211_ATTR_FRAME",
            Self::Ssid => "NL80211_ATTR_SSID",
            Self::ReasonCode => "NL80211_ATTR_REASON_CODE",
            Self::TimedOut => "NL80211_ATTR_TIMED_OUT",
            Self::DisconnectedByAp => "NL80211_ATTR_DISCONNECTED_BY_AP",
            Self::StatusCode => "NL80211_ATTR_STATUS_CODE",
            Self::ReqIe => "NL80211_ATTR_REQ_IE",
            Self::RespIe => "NL80211_ATTR_RESP_IE",
            Self::SchedScanInterval => "NL80211_ATTR_SCHED_SCAN_INTERVAL",
            Self::SchedScanMatch => "NL80211_ATTR_SCHED_SCAN_MATCH",
            Self::ScanFlags => "NL80211_ATTR_SCAN_FLAGS",
        }
    }
}

/// Attributes nested inside `NL80211_ATTR_BSS`.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nl80211BssAttr {
    Invalid = 0,
    Bssid = 1,
    Frequency = 2,
    Tsf = 3,
    BeaconInterval = 4,
    Capability = 5,
    InformationElements = 6,
    SignalMbm = 7,
    SignalUnspec = 8,
    Status = 9,
    SeenMsAgo = 10,
}

/// Attributes nested inside each `NL80211_ATTR_SCHED_SCAN_MATCH` entry.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nl80211SchedScanMatchAttr {
    Invalid = 0,
    Ssid = 1,
    Rssi = 2,
}

/// Interface types (`NL80211_ATTR_IFTYPE` values).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nl80211Iftype {
    Unspecified = 0,
    Adhoc = 1,
    Station = 2,
    Ap = 3,
    ApVlan = 4,
    Wds = 5,
    Monitor = 6,
    MeshPoint = 7,
    P2pClient = 8,
    P2pGo = 9,
}

/// Scan request flag: randomize the source MAC address.
pub const NL80211_SCAN_FLAG_RANDOM_ADDR: u32 = 1 << 3;

/// Information element ID carrying the SSID.
pub const WLAN_EID_SSID: u8 = 0;
