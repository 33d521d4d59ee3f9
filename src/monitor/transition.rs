//! Online/offline transitions between two consecutive sweeps

use super::status::StatusSnapshot;
use crate::alerts::AlertKind;

/// Compare the committed snapshot with the one it replaced.
///
/// A device only produces an alert if it was present in `previous` with a
/// different online flag; first sightings never alert.
pub fn detect_transitions(previous: &StatusSnapshot, current: &StatusSnapshot) -> Vec<AlertKind> {
    current
        .iter()
        .filter_map(|(ip, record)| {
            let before = previous.get(ip)?;
            match (before.online, record.online) {
                (false, true) => Some(AlertKind::Online { ip: ip.clone() }),
                (true, false) => Some(AlertKind::Offline { ip: ip.clone() }),
                _ => None,
            }
        })
        .collect()
}
