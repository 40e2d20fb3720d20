use crate::curve::CURVE_SIZE;

pub const MODES: usize = 5;

pub trait Nvm {
    fn capacity(&self) -> usize;
    fn read_byte(&self, addr: usize) -> u8;
    fn write_byte(&mut self, addr: usize, value: u8);
}

impl<N: Nvm + ?Sized> Nvm for &mut N {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read_byte(&self, addr: usize) -> u8 {
        (**self).read_byte(addr)
    }

    fn write_byte(&mut self, addr: usize, value: u8) {
        (**self).write_byte(addr, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryNvm {
    bytes: Vec<u8>,
    writes: usize,
}

impl MemoryNvm {
    pub fn erased(capacity: usize) -> Self {
        Self {
            bytes: vec![0xFF; capacity],
            writes: 0,
        }
    }

    pub fn from_image(bytes: Vec<u8>) -> Self {
        Self { bytes, writes: 0 }
    }

    pub fn image(&self) -> &[u8] {
        &self.bytes
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Nvm for MemoryNvm {
    fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn read_byte(&self, addr: usize) -> u8 {
        self.bytes.get(addr).copied().unwrap_or(0xFF)
    }

    fn write_byte(&mut self, addr: usize, value: u8) {
        if let Some(byte) = self.bytes.get_mut(addr) {
            *byte = value;
            self.writes += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistentRecord {
    pub last_index: u8,
    pub profile: [u8; MODES],
}

impl PersistentRecord {
    pub fn default_with_index(last_index: u8) -> Self {
        let mut profile = [0; MODES];
        let curve = usize::from(CURVE_SIZE);
        for (i, slot) in profile.iter_mut().enumerate() {
            let position = ((i + 1) * curve * 2 + MODES) / (MODES * 2);
            *slot = position.clamp(1, curve) as u8;
        }
        Self {
            last_index: last_index.min(MODES as u8 - 1),
            profile,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveModes {
    modes: [u8; MODES],
    count: u8,
}

impl ActiveModes {
    pub fn compact(profile: &[u8; MODES]) -> Self {
        let mut active = Self::default();
        let mut last = 0;
        for &position in profile {
            if position == 0 || last >= CURVE_SIZE {
                continue;
            }
            last = position.min(CURVE_SIZE);
            active.modes[usize::from(active.count)] = last;
            active.count += 1;
        }
        active
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.modes[..usize::from(self.count)]
    }

    pub fn position(&self, index: u8) -> u8 {
        self.as_slice().get(usize::from(index)).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedProfile {
    pub record: PersistentRecord,
    pub active: ActiveModes,
    pub was_reset: bool,
}

// The index byte lives at the top of the NVM and slot `i` directly below it
// at `capacity - 2 - i`. A byte is only written when it differs from the
// shadow of what the NVM holds.
#[derive(Debug)]
pub struct ProfileStore<N> {
    nvm: N,
    shadow: PersistentRecord,
    default_index: u8,
}

impl<N: Nvm> ProfileStore<N> {
    pub fn new(nvm: N, default_index: u8) -> Self {
        Self {
            nvm,
            shadow: PersistentRecord {
                last_index: 0,
                profile: [0; MODES],
            },
            default_index,
        }
    }

    pub fn nvm(&self) -> &N {
        &self.nvm
    }

    pub fn into_nvm(self) -> N {
        self.nvm
    }

    pub fn shadow(&self) -> &PersistentRecord {
        &self.shadow
    }

    pub fn load(&mut self) -> LoadedProfile {
        self.shadow.last_index = self.read(self.index_addr());
        for i in 0..MODES {
            self.shadow.profile[i] = self.read(self.slot_addr(i));
        }

        let active = ActiveModes::compact(&self.shadow.profile);
        if usize::from(self.shadow.last_index) >= MODES || active.count() == 0 {
            let record = self.reset();
            return LoadedProfile {
                record,
                active: ActiveModes::compact(&record.profile),
                was_reset: true,
            };
        }

        LoadedProfile {
            record: self.shadow,
            active,
            was_reset: false,
        }
    }

    pub fn save(&mut self, record: &PersistentRecord) -> usize {
        let mut writes = 0;
        if self.shadow.last_index != record.last_index {
            writes += self.write(self.index_addr(), record.last_index);
            self.shadow.last_index = record.last_index;
        }
        for i in 0..MODES {
            if self.shadow.profile[i] != record.profile[i] {
                writes += self.write(self.slot_addr(i), record.profile[i]);
                self.shadow.profile[i] = record.profile[i];
            }
        }
        writes
    }

    pub fn reset(&mut self) -> PersistentRecord {
        let record = PersistentRecord::default_with_index(self.default_index);
        self.save(&record);
        record
    }

    // `None` when the NVM is too small to hold the byte.
    fn index_addr(&self) -> Option<usize> {
        self.nvm.capacity().checked_sub(1)
    }

    fn slot_addr(&self, slot: usize) -> Option<usize> {
        self.nvm.capacity().checked_sub(2 + slot)
    }

    fn read(&self, addr: Option<usize>) -> u8 {
        addr.map_or(0xFF, |addr| self.nvm.read_byte(addr))
    }

    fn write(&mut self, addr: Option<usize>, value: u8) -> usize {
        match addr {
            Some(addr) => {
                self.nvm.write_byte(addr, value);
                1
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn store_with(last_index: u8, profile: [u8; MODES]) -> ProfileStore<MemoryNvm> {
        let mut image = vec![0xFF; 64];
        image[63] = last_index;
        for (i, position) in profile.iter().enumerate() {
            image[62 - i] = *position;
        }
        ProfileStore::new(MemoryNvm::from_image(image), 2)
    }

    #[test]
    fn default_profile_spreads_evenly() {
        let record = PersistentRecord::default_with_index(2);
        assert_eq!(record.profile, [1, 2, 3, 4, 5]);
        assert_eq!(record.last_index, 2);
    }

    #[test]
    fn load_reads_record_and_compacts() {
        let mut store = store_with(1, [1, 0, 3, 0, 5]);
        let loaded = store.load();

        assert!(!loaded.was_reset);
        assert_eq!(loaded.record.last_index, 1);
        assert_eq!(loaded.record.profile, [1, 0, 3, 0, 5]);
        assert_eq!(loaded.active.as_slice(), &[1, 3, 5]);
        assert_eq!(loaded.active.count(), 3);
        assert_eq!(*store.shadow(), loaded.record);
    }

    #[test]
    fn compaction_yields_every_ascending_non_zero_entry() {
        let cases: [([u8; MODES], &[u8]); 5] = [
            ([1, 2, 3, 4, 5], &[1, 2, 3, 4, 5]),
            ([2, 4, 0, 0, 0], &[2, 4]),
            ([0, 0, 0, 0, 3], &[3]),
            ([0, 1, 0, 2, 0], &[1, 2]),
            ([1, 3, 4, 0, 0], &[1, 3, 4]),
        ];
        for (profile, expected) in cases {
            let active = ActiveModes::compact(&profile);
            assert_eq!(active.as_slice(), expected);
            assert_eq!(usize::from(active.count()), expected.len());
        }
    }

    #[test]
    fn compaction_stops_after_curve_maximum() {
        let active = ActiveModes::compact(&[2, 5, 3, 4, 1]);
        assert_eq!(active.as_slice(), &[2, 5]);

        let active = ActiveModes::compact(&[1, 0xFF, 2, 0, 0]);
        assert_eq!(active.as_slice(), &[1, CURVE_SIZE]);
    }

    #[test]
    fn erased_memory_triggers_reset() {
        let mut store = ProfileStore::new(MemoryNvm::erased(64), 2);
        let loaded = store.load();

        assert!(loaded.was_reset);
        assert_eq!(loaded.record, PersistentRecord::default_with_index(2));
        assert_eq!(loaded.active.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(store.nvm().read_byte(63), 2);
        assert_eq!(store.nvm().read_byte(62), 1);
        assert_eq!(store.nvm().read_byte(58), 5);
    }

    #[test]
    fn empty_profile_triggers_reset() {
        let mut store = store_with(0, [0; MODES]);
        assert!(store.load().was_reset);
    }

    #[test]
    fn reset_is_deterministic_from_any_prior_state() {
        let priors = [
            (9, [0xFF; MODES]),
            (0, [0; MODES]),
            (4, [5, 4, 3, 2, 1]),
            (1, [1, 1, 1, 1, 1]),
        ];
        for (last_index, profile) in priors {
            let mut store = store_with(last_index, profile);
            store.load();
            let record = store.reset();

            assert_eq!(record, PersistentRecord::default_with_index(2));
            let reloaded = store.load();
            assert!(!reloaded.was_reset);
            assert_eq!(reloaded.record, record);
        }
    }

    #[test]
    fn save_writes_only_changed_bytes() {
        let mut store = store_with(2, [1, 2, 3, 4, 5]);
        let mut record = store.load().record;
        let before = store.nvm().writes();

        record.profile[3] = 0;
        record.last_index = 1;

        assert_eq!(store.save(&record), 2);
        assert_eq!(store.nvm().writes() - before, 2);
        assert_eq!(store.nvm().read_byte(59), 0);
        assert_eq!(store.nvm().read_byte(63), 1);
    }

    #[test]
    fn repeated_save_is_free() {
        let mut store = store_with(2, [1, 2, 3, 4, 5]);
        let mut record = store.load().record;
        record.profile[0] = 2;

        assert_eq!(store.save(&record), 1);
        let writes = store.nvm().writes();

        assert_eq!(store.save(&record), 0);
        assert_eq!(store.nvm().writes(), writes);
    }

    #[test]
    fn undersized_nvm_falls_back_to_defaults_without_panicking() {
        let mut store = ProfileStore::new(MemoryNvm::erased(4), 2);

        let loaded = store.load();

        assert!(loaded.was_reset);
        assert_eq!(loaded.active.as_slice(), &[1, 2, 3, 4, 5]);
        // index and the first three slots fit; the rest have no backing byte
        assert_eq!(store.nvm().writes(), 4);
        assert_eq!(store.nvm().image(), &[3, 2, 1, 2]);
    }
}
