/// Domain-separated BLAKE3 hasher producing hex digests.
///
/// Each hasher carries a domain tag that is prepended to every computation,
/// so digests of different record kinds never collide even when the framed
/// bytes are identical.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for node metadata.
    pub const META: Self = Self {
        domain: "folio-meta-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Start an incremental digest for this domain.
    pub fn start(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        Digest { hasher }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> String {
        let mut digest = self.start();
        digest.bytes(data);
        digest.finish()
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// An in-progress digest. Every value is length-framed, so adjacent
/// fields cannot run into each other.
pub struct Digest {
    hasher: blake3::Hasher,
}

impl Digest {
    /// Feed a length-framed byte string.
    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(&(data.len() as u64).to_le_bytes());
        self.hasher.update(data);
        self
    }

    /// Feed a length-framed string.
    pub fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    /// Feed a signed integer.
    pub fn int(&mut self, value: i64) -> &mut Self {
        self.hasher.update(&value.to_le_bytes());
        self
    }

    /// Feed a one-byte tag, used to mark optional and structural values.
    pub fn tag(&mut self, tag: u8) -> &mut Self {
        self.hasher.update(&[tag]);
        self
    }

    /// Finish and return the hex digest.
    pub fn finish(&self) -> String {
        hex::encode(self.hasher.finalize().as_bytes())
    }
}
