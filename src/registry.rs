use std::collections::BTreeMap;

/// 32-bit hash of a simple class name, as stored in saved scenes. Collisions
/// are not guarded against; on rebuild the later class silently wins.
pub fn class_name_hash(name: &str) -> u32 {
    let digest = blake3::hash(name.as_bytes());
    let bytes: [u8; 4] = digest.as_bytes()[..4].try_into().expect("digest shorter than four bytes");
    u32::from_le_bytes(bytes)
}

/// Name-hash to class-name mapping for every script class discovered in the
/// loaded assembly. Rebuilt wholesale on every (re)load.
#[derive(Default)]
pub struct ClassRegistry {
    names: BTreeMap<u32, String>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, classes: impl IntoIterator<Item = String>) {
        self.names.clear();
        for name in classes {
            self.names.insert(class_name_hash(&name), name);
        }
    }

    pub fn resolve(&self, hash: u32) -> Option<&str> {
        self.names.get(&hash).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}
