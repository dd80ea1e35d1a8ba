//! Captured artifact storage.
//!
//! Holds at most one image reference per slot. This is the single source of
//! truth consulted by both the step sequencer (completion) and the
//! auto-capture gate (only empty slots are auto-captured).

use crate::types::{CaptureArtifact, CapturePayload, CaptureSlotKey, InitialCaptures};

/// Fixed three-slot artifact store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureArtifactStore {
    slots: [Option<CaptureArtifact>; 3],
}

impl CaptureArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled from resume values.
    pub fn seeded(initial: &InitialCaptures) -> Self {
        let mut store = Self::new();
        store.seed_from(initial);
        store
    }

    /// Replace the whole content with `initial`; slots without a value become empty.
    pub fn seed_from(&mut self, initial: &InitialCaptures) {
        for slot in CaptureSlotKey::ALL {
            self.slots[slot.index()] = initial.get(slot).cloned();
        }
    }

    /// Store `artifact` in `slot`, returning the artifact it replaced.
    pub fn set(&mut self, slot: CaptureSlotKey, artifact: CaptureArtifact) -> Option<CaptureArtifact> {
        self.slots[slot.index()].replace(artifact)
    }

    /// Empty `slot`. Clearing an empty slot is a no-op.
    pub fn clear(&mut self, slot: CaptureSlotKey) -> Option<CaptureArtifact> {
        self.slots[slot.index()].take()
    }

    /// Artifact held by `slot`.
    pub fn get(&self, slot: CaptureSlotKey) -> Option<&CaptureArtifact> {
        self.slots[slot.index()].as_ref()
    }

    /// Whether `slot` holds an artifact.
    pub fn is_filled(&self, slot: CaptureSlotKey) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// True iff every slot holds an artifact.
    pub fn all_filled(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Number of filled slots.
    pub fn filled_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Empty every slot.
    pub fn clear_all(&mut self) {
        self.slots = Default::default();
    }

    /// Completion payload, `None` while any slot is empty.
    pub fn to_payload(&self) -> Option<CapturePayload> {
        Some(CapturePayload {
            front: self.get(CaptureSlotKey::Front)?.clone(),
            back: self.get(CaptureSlotKey::Back)?.clone(),
            selfie: self.get(CaptureSlotKey::Selfie)?.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn artifact(uri: &str) -> CaptureArtifact {
        CaptureArtifact::new(uri).unwrap()
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = CaptureArtifactStore::new();
        assert!(!store.all_filled());
        assert_eq!(store.filled_count(), 0);
        assert!(store.to_payload().is_none());
    }

    #[test]
    fn test_set_get_clear() {
        let mut store = CaptureArtifactStore::new();
        assert_eq!(store.set(CaptureSlotKey::Back, artifact("b.jpg")), None);
        assert_eq!(store.get(CaptureSlotKey::Back), Some(&artifact("b.jpg")));
        assert!(store.is_filled(CaptureSlotKey::Back));
        assert!(!store.is_filled(CaptureSlotKey::Front));

        assert_eq!(store.clear(CaptureSlotKey::Back), Some(artifact("b.jpg")));
        assert_eq!(store.get(CaptureSlotKey::Back), None);
    }

    #[test]
    fn test_clear_empty_slot_is_noop() {
        let mut store = CaptureArtifactStore::new();
        store.set(CaptureSlotKey::Front, artifact("f.jpg"));
        assert_eq!(store.clear(CaptureSlotKey::Selfie), None);
        assert_eq!(store.filled_count(), 1);
    }

    #[test]
    fn test_payload_once_all_filled() {
        let mut store = CaptureArtifactStore::new();
        store.set(CaptureSlotKey::Front, artifact("f.jpg"));
        store.set(CaptureSlotKey::Back, artifact("b.jpg"));
        assert!(store.to_payload().is_none());

        store.set(CaptureSlotKey::Selfie, artifact("s.jpg"));
        let payload = store.to_payload().unwrap();
        assert_eq!(payload.front.uri(), "f.jpg");
        assert_eq!(payload.back.uri(), "b.jpg");
        assert_eq!(payload.selfie.uri(), "s.jpg");
    }

    #[test]
    fn test_seed_replaces_content() {
        let mut store = CaptureArtifactStore::new();
        store.set(CaptureSlotKey::Front, artifact("old.jpg"));

        let initial = InitialCaptures::default().with(CaptureSlotKey::Selfie, artifact("s.jpg"));
        store.seed_from(&initial);

        assert_eq!(store.get(CaptureSlotKey::Front), None);
        assert_eq!(store.get(CaptureSlotKey::Selfie), Some(&artifact("s.jpg")));
    }

    fn arb_slot() -> impl Strategy<Value = CaptureSlotKey> {
        prop_oneof![
            Just(CaptureSlotKey::Front),
            Just(CaptureSlotKey::Back),
            Just(CaptureSlotKey::Selfie),
        ]
    }

    proptest! {
        /// `all_filled` agrees with the three individual lookups after any
        /// sequence of set/clear operations, and clear is always observed.
        #[test]
        fn prop_all_filled_matches_slots(ops in prop::collection::vec((arb_slot(), any::<bool>()), 0..40)) {
            let mut store = CaptureArtifactStore::new();
            for (i, (slot, set)) in ops.into_iter().enumerate() {
                if set {
                    store.set(slot, artifact(&format!("img-{i}.jpg")));
                } else {
                    store.clear(slot);
                    prop_assert!(store.get(slot).is_none());
                }
                let expected = CaptureSlotKey::ALL.iter().all(|s| store.get(*s).is_some());
                prop_assert_eq!(store.all_filled(), expected);
                prop_assert_eq!(store.to_payload().is_some(), expected);
            }
        }
    }
}
