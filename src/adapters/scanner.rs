//! Line-oriented beacon source for dry runs and replays.
//!
//! Each input line carries one beacon as `<ephid-hex> <rssi>`. Blank lines
//! and `#` comments are skipped; malformed lines are logged and dropped.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::domain::EphId;
use crate::ports::{BeaconPoll, BeaconSource, RadioError, ReceivedBeacon};

/// Beacon source fed by a reader thread.
///
/// The source reports [`BeaconPoll::Closed`] once the input is exhausted
/// and every parsed beacon has been delivered.
pub struct LineBeaconSource {
    beacons: Receiver<ReceivedBeacon>,
}

impl LineBeaconSource {
    /// Read beacons from `reader` on a background thread.
    pub fn spawn<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, beacons) = mpsc::channel();
        thread::spawn(move || {
            for (index, line) in reader.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!("Beacon input failed: {e}");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                match parse_beacon(line) {
                    Some(beacon) => {
                        if tx.send(beacon).is_err() {
                            break;
                        }
                    }
                    // The line may hold identifiers; log its position only.
                    None => tracing::warn!("Skipping malformed beacon on line {}", index + 1),
                }
            }
        });
        Self { beacons }
    }

    /// Read beacons from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::spawn(std::io::BufReader::new(std::io::stdin()))
    }
}

impl BeaconSource for LineBeaconSource {
    fn poll(&mut self, timeout: Duration) -> Result<BeaconPoll, RadioError> {
        match self.beacons.recv_timeout(timeout) {
            Ok(beacon) => Ok(BeaconPoll::Beacon(beacon)),
            Err(RecvTimeoutError::Timeout) => Ok(BeaconPoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(BeaconPoll::Closed),
        }
    }
}

fn parse_beacon(line: &str) -> Option<ReceivedBeacon> {
    let mut fields = line.split_whitespace();
    let (Some(ephid), Some(rssi), None) = (fields.next(), fields.next(), fields.next()) else {
        return None;
    };

    let ephid = hex::decode(ephid)
        .ok()
        .and_then(|bytes| EphId::from_slice(&bytes).ok())?;
    let rssi = rssi.parse().ok()?;
    Some(ReceivedBeacon { ephid, rssi })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn drain(source: &mut LineBeaconSource) -> Vec<ReceivedBeacon> {
        let mut beacons = Vec::new();
        loop {
            match source.poll(Duration::from_secs(5)).expect("Should poll") {
                BeaconPoll::Beacon(beacon) => beacons.push(beacon),
                BeaconPoll::Idle => panic!("Input should not stall"),
                BeaconPoll::Closed => return beacons,
            }
        }
    }

    #[test]
    fn test_parse_beacon() {
        let beacon = parse_beacon("0102030405060708090a0b0c0d0e0f10 -62").expect("Should parse");
        assert_eq!(beacon.rssi, -62);
        assert_eq!(beacon.ephid.as_bytes()[0], 1);
        assert_eq!(beacon.ephid.as_bytes()[15], 16);
    }

    #[test]
    fn test_parse_beacon_rejects_malformed() {
        assert!(parse_beacon("0102 -62").is_none());
        assert!(parse_beacon("zz02030405060708090a0b0c0d0e0f10 -62").is_none());
        assert!(parse_beacon("0102030405060708090a0b0c0d0e0f10").is_none());
        assert!(parse_beacon("0102030405060708090a0b0c0d0e0f10 loud").is_none());
        assert!(parse_beacon("0102030405060708090a0b0c0d0e0f10 -62 extra").is_none());
    }

    #[test]
    fn test_source_skips_bad_lines_and_closes() {
        let input = "\
# replay
00112233445566778899aabbccddeeff -40

not a beacon
ffeeddccbbaa99887766554433221100 -75
";
        let mut source = LineBeaconSource::spawn(Cursor::new(input.to_string()));
        let beacons = drain(&mut source);

        assert_eq!(beacons.len(), 2);
        assert_eq!(beacons[0].rssi, -40);
        assert_eq!(beacons[1].ephid, EphId::from_bytes([
            0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa, 0x99, 0x88,
            0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00,
        ]));
        // Stays closed.
        assert_eq!(source.poll(Duration::from_millis(1)).expect("Should poll"), BeaconPoll::Closed);
    }
}
