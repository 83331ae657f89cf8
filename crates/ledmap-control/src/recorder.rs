//! Captures routed DMX into a replay recording

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use ledmap_core::{RecordingBuilder, ReplayRecording, UniverseBuffer, UNIVERSE_SIZE};
use parking_lot::Mutex;

use crate::Result;

struct Capture {
    builder: RecordingBuilder,
    started: Option<Instant>,
    /// Last value sent on each universe
    snapshot: BTreeMap<u16, UniverseBuffer>,
    /// Universes written since the last committed frame
    pending: BTreeSet<u16>,
    pending_at: f64,
}

impl Capture {
    fn new(builder: RecordingBuilder) -> Self {
        Self {
            builder,
            started: None,
            snapshot: BTreeMap::new(),
            pending: BTreeSet::new(),
            pending_at: 0.0,
        }
    }

    fn commit(&mut self, universes: &[u16]) {
        if self.pending.is_empty() {
            return;
        }
        let mut data = Vec::with_capacity(universes.len() * UNIVERSE_SIZE);
        for universe in universes {
            match self.snapshot.get(universe) {
                Some(buffer) => data.extend_from_slice(buffer),
                None => data.extend_from_slice(&[0u8; UNIVERSE_SIZE]),
            }
        }
        self.builder.push(self.pending_at, data);
        self.pending.clear();
    }
}

/// Records what the routing engine sends while it is attached.
///
/// Submissions from several players are merged into one snapshot per tick: a
/// frame is committed once a universe is written a second time. Universes
/// nobody has sent yet are recorded as zeros; the others keep their last
/// sent value. Timestamps are seconds since the first recorded submission.
pub struct DmxRecorder {
    name: String,
    canvas: (u32, u32),
    point_count: usize,
    universes: Vec<u16>,
    capture: Mutex<Capture>,
}

impl DmxRecorder {
    pub fn new(
        name: impl Into<String>,
        canvas: (u32, u32),
        point_count: usize,
        universes: Vec<u16>,
    ) -> Self {
        let name = name.into();
        let builder = RecordingBuilder::new(name.clone(), canvas, point_count, universes.clone());
        Self {
            name,
            canvas,
            point_count,
            universes,
            capture: Mutex::new(Capture::new(builder)),
        }
    }

    /// Merge the universes sent by one submission. Universes outside the
    /// recording's layout are ignored.
    pub fn record(&self, sent: &BTreeMap<u16, UniverseBuffer>) {
        let sent: Vec<_> = sent
            .iter()
            .filter(|(universe, _)| self.universes.contains(universe))
            .collect();
        if sent.is_empty() {
            return;
        }

        let mut capture = self.capture.lock();
        if sent.iter().any(|(universe, _)| capture.pending.contains(universe)) {
            capture.commit(&self.universes);
        }
        let started = *capture.started.get_or_insert_with(Instant::now);
        if capture.pending.is_empty() {
            capture.pending_at = started.elapsed().as_secs_f64();
        }
        for (universe, buffer) in sent {
            capture.snapshot.insert(*universe, *buffer);
            capture.pending.insert(*universe);
        }
    }

    /// Frames recorded so far, counting the tick still being merged.
    pub fn frame_count(&self) -> usize {
        let capture = self.capture.lock();
        capture.builder.len() + usize::from(!capture.pending.is_empty())
    }

    /// Close the recording and start a fresh one.
    pub fn finish(&self) -> Result<ReplayRecording> {
        let fresh = RecordingBuilder::new(
            self.name.clone(),
            self.canvas,
            self.point_count,
            self.universes.clone(),
        );
        let mut capture = self.capture.lock();
        capture.commit(&self.universes);
        let done = std::mem::replace(&mut *capture, Capture::new(fresh));
        drop(capture);
        Ok(done.builder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_universes_in_order() {
        let recorder = DmxRecorder::new("take", (4, 1), 4, vec![5, 2]);
        let mut packed = BTreeMap::new();
        packed.insert(2, [2u8; UNIVERSE_SIZE]);
        packed.insert(5, [5u8; UNIVERSE_SIZE]);
        recorder.record(&packed);
        packed.remove(&2);
        packed.insert(5, [7u8; UNIVERSE_SIZE]);
        recorder.record(&packed);
        assert_eq!(recorder.frame_count(), 2);

        let recording = recorder.finish().unwrap();
        assert_eq!(recording.len(), 2);
        assert_eq!(recording.frames()[0].timestamp, 0.0);
        let first = recording.universe_payloads(&recording.frames()[0]);
        assert_eq!((first[0].0, first[0].1[0]), (5, 5));
        assert_eq!((first[1].0, first[1].1[0]), (2, 2));
        // universe 2 was not sent again and keeps its value
        let second = recording.universe_payloads(&recording.frames()[1]);
        assert_eq!((second[0].1[0], second[1].1[0]), (7, 2));

        assert_eq!(recorder.frame_count(), 0);
    }

    #[test]
    fn test_disjoint_submissions_share_a_frame() {
        let recorder = DmxRecorder::new("take", (4, 1), 4, vec![0, 1]);
        let red = BTreeMap::from([(0u16, [200u8; UNIVERSE_SIZE])]);
        let blue = BTreeMap::from([(1u16, [50u8; UNIVERSE_SIZE])]);

        recorder.record(&red);
        recorder.record(&blue);
        assert_eq!(recorder.frame_count(), 1);
        recorder.record(&red);
        assert_eq!(recorder.frame_count(), 2);

        let recording = recorder.finish().unwrap();
        let first = recording.universe_payloads(&recording.frames()[0]);
        assert_eq!((first[0].1[0], first[1].1[0]), (200, 50));
        let second = recording.universe_payloads(&recording.frames()[1]);
        assert_eq!((second[0].1[0], second[1].1[0]), (200, 50));
    }

    #[test]
    fn test_unknown_universes_are_ignored() {
        let recorder = DmxRecorder::new("take", (4, 1), 4, vec![0]);
        recorder.record(&BTreeMap::from([(9u16, [1u8; UNIVERSE_SIZE])]));
        recorder.record(&BTreeMap::new());
        assert_eq!(recorder.frame_count(), 0);
        assert!(recorder.finish().unwrap().is_empty());
    }
}
