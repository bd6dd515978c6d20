//! Monitor command - print decoded nl80211 events.

use clap::Args;
use tokio_stream::StreamExt;
use tracing::debug;
use wificond::Result;
use wificond::nl80211::{
    EventDecoder, NL80211_MULTICAST_GROUP_CONFIG, NL80211_MULTICAST_GROUP_MLME,
    NL80211_MULTICAST_GROUP_SCAN, Nl80211EventSocket,
};

use crate::output::print_event;

#[derive(Args)]
pub struct MonitorArgs {
    /// Only show events for this interface index
    #[arg(long)]
    pub ifindex: Option<u32>,

    /// Multicast groups to join (mlme, scan, config)
    #[arg(short, long = "group", value_delimiter = ',')]
    pub groups: Vec<String>,
}

pub async fn run(args: MonitorArgs, json: bool) -> Result<()> {
    let groups: Vec<&str> = if args.groups.is_empty() {
        vec![
            NL80211_MULTICAST_GROUP_MLME,
            NL80211_MULTICAST_GROUP_SCAN,
            NL80211_MULTICAST_GROUP_CONFIG,
        ]
    } else {
        args.groups.iter().map(String::as_str).collect()
    };

    let mut events = Nl80211EventSocket::with_groups(&groups).await?;

    eprintln!("Monitoring nl80211 events ({})...", groups.join(", "));
    eprintln!("Press Ctrl+C to stop.");

    while let Some(result) = events.next().await {
        let packet = result?;

        let Some(event) = EventDecoder::decode(&packet) else {
            debug!(cmd = packet.command(), "no event decoded");
            continue;
        };

        if args.ifindex.is_some_and(|i| i != event.interface_index()) {
            continue;
        }

        print_event(&event, json)?;
    }

    Ok(())
}
