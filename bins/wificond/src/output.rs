//! Text and JSON rendering of events and scan results.

use std::io;

use serde::Serialize;
use wificond::nl80211::{MlmeEvent, Nl80211Event, ScanResult, StationEventKind};
use wificond::{Error, Result};

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Io(io::Error::from(e)))
}

/// Print one event on a single line.
pub fn print_event(event: &Nl80211Event, json: bool) -> Result<()> {
    if json {
        println!("{}", to_json(event)?);
        return Ok(());
    }

    let ifindex = event.interface_index();
    match event {
        Nl80211Event::Mlme(mlme) => {
            print!(
                "{}: {} bssid {} status {}",
                ifindex,
                mlme.name(),
                mlme.bssid(),
                mlme.status_code()
            );
            match mlme {
                MlmeEvent::Connect(e) if e.timed_out => print!(" timed-out"),
                MlmeEvent::Disconnect(e) => {
                    if let Some(reason) = e.reason_code {
                        print!(" reason {}", reason);
                    }
                    if e.disconnected_by_ap {
                        print!(" by-ap");
                    }
                }
                _ => {}
            }
            println!();
        }
        Nl80211Event::Scan(scan) => {
            println!(
                "{}: scan {:?} ssids {} freqs {}",
                ifindex,
                scan.kind,
                scan.ssids.len(),
                scan.frequencies.len()
            );
        }
        Nl80211Event::Station(station) => {
            let action = match station.kind {
                StationEventKind::New => "new",
                StationEventKind::Del => "del",
            };
            println!("{}: station {} {}", ifindex, action, station.mac);
        }
        Nl80211Event::InterfaceRemoved { .. } => {
            println!("{}: interface removed", ifindex);
        }
    }
    Ok(())
}

/// Print scan results, strongest signal first.
pub fn print_scan_results(results: &mut [ScanResult], json: bool) -> Result<()> {
    results.sort_by(|a, b| b.signal_mbm.cmp(&a.signal_mbm));

    if json {
        println!("{}", to_json(results)?);
        return Ok(());
    }

    println!(
        "{:<19} {:>6} {:>8}  {}",
        "BSSID", "FREQ", "SIGNAL", "SSID"
    );
    for result in results.iter() {
        let marker = if result.associated { "*" } else { " " };
        println!(
            "{}{:<18} {:>6} {:>8.2}  {}",
            marker,
            result.bssid.to_string(),
            result.frequency,
            f64::from(result.signal_mbm) / 100.0,
            result.ssid_lossy()
        );
    }
    Ok(())
}
