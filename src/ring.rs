//! Provides the consistent-hash ring used to route keys to their owner node.
//!
//! Every peer occupies a configurable number of virtual positions on a ring
//! of `u32` hash values. A key is owned by the peer whose next virtual
//! position follows the key's hash clockwise. This way, adding or removing a
//! peer only relocates the keys adjacent to its virtual positions instead of
//! reshuffling the whole keyspace.
//!
//! The hash function is injectable (mostly to keep tests deterministic) and
//! defaults to CRC32/IEEE.
//!
//! # Examples
//! ```
//! # use callisto::ring::HashRing;
//! let mut ring = HashRing::new(50);
//! ring.add(&["10.0.0.1:7410", "10.0.0.2:7410", "10.0.0.3:7410"]);
//!
//! // Routing is deterministic...
//! let owner = ring.get("some-key").unwrap().to_owned();
//! assert_eq!(ring.get("some-key"), Some(owner.as_str()));
//!
//! // ...and an empty ring has no owners at all.
//! let empty = HashRing::new(50);
//! assert_eq!(empty.get("some-key"), None);
//! ```

/// Maps bytes to a position on the ring.
pub type HashFn = fn(&[u8]) -> u32;

/// A consistent-hash ring mapping keys to peer ids.
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    // All virtual positions, sorted ascending. Each position carries its
    // owning peer so that removing a peer cannot splice a colliding position
    // which belongs to somebody else.
    ring: Vec<(u32, String)>,
}

impl HashRing {
    /// Creates a ring on which every peer occupies `replicas` virtual
    /// positions, hashed with CRC32/IEEE.
    ///
    /// # Panics
    /// Panics if `replicas` is zero, as such a ring could never own a key.
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hasher(replicas, crc32fast::hash)
    }

    /// Creates a ring which uses the given hash function.
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        assert!(replicas > 0, "a hash ring needs at least one replica");

        HashRing {
            replicas,
            hash,
            ring: Vec::new(),
        }
    }

    /// Places the given peers on the ring.
    ///
    /// For each peer, `replicas` virtual positions are derived by hashing the
    /// replica index concatenated with the peer id. Peers already present are
    /// not deduplicated - adding a peer twice doubles its share.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for index in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", index, peer).as_bytes());
                self.ring.push((position, peer.to_owned()));
            }
        }

        self.ring.sort();
    }

    /// Removes all virtual positions of the given peer.
    ///
    /// Keys previously owned by this peer fall to their next clockwise
    /// neighbour. Stale cache entries on the former owner are simply left to
    /// age out.
    pub fn remove(&mut self, peer: &str) {
        self.ring.retain(|(_, owner)| owner != peer);
    }

    /// Returns the peer owning the given key or `None` on an empty ring.
    ///
    /// The owner is the peer holding the first virtual position at or after
    /// the key's hash, wrapping around to the start of the ring. Two peers
    /// colliding on the same position resolve deterministically to the one
    /// sorting first.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }

        let position = (self.hash)(key.as_bytes());
        let index = self
            .ring
            .partition_point(|(candidate, _)| *candidate < position)
            % self.ring.len();

        Some(self.ring[index].1.as_str())
    }

    /// Returns the number of virtual positions on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Determines if no peer has been added yet.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::HashRing;
    use std::collections::HashMap;

    /// Interprets the hashed bytes as a decimal number, which makes the
    /// virtual positions trivial to predict: peer "6" with replica indices
    /// 0..3 sits at 6, 16 and 26.
    fn decimal_hash(data: &[u8]) -> u32 {
        std::str::from_utf8(data).unwrap().parse().unwrap()
    }

    #[test]
    fn keys_are_routed_to_the_next_clockwise_position() {
        let mut ring = HashRing::with_hasher(3, decimal_hash);
        ring.add(&["6", "4", "2"]);

        // The ring now holds 2, 4, 6, 12, 14, 16, 22, 24 and 26...
        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        // ...and anything beyond the last position wraps around.
        assert_eq!(ring.get("27"), Some("2"));

        // Adding another peer takes over the keys adjacent to its positions.
        ring.add(&["8"]);
        assert_eq!(ring.get("27"), Some("8"));
    }

    #[test]
    fn every_peer_occupies_replicas_positions() {
        let mut ring = HashRing::new(50);
        assert!(ring.is_empty());

        ring.add(&["A", "B", "C"]);
        assert_eq!(ring.len(), 150);

        ring.remove("B");
        assert_eq!(ring.len(), 100);
    }

    #[test]
    fn an_empty_ring_owns_nothing() {
        let ring = HashRing::new(50);
        assert_eq!(ring.get("x"), None);
    }

    #[test]
    fn routing_is_stable_without_mutation() {
        let mut ring = HashRing::new(50);
        ring.add(&["A", "B", "C"]);

        for index in 0..100 {
            let key = format!("key{}", index);
            assert_eq!(ring.get(&key), ring.get(&key));
        }
    }

    #[test]
    fn removing_a_peer_keeps_colliding_positions_of_others() {
        // Everything collides on position 42 here...
        let mut ring = HashRing::with_hasher(1, |_| 42);
        ring.add(&["A", "B"]);
        assert_eq!(ring.len(), 2);

        // ...and the collision resolves to the peer sorting first.
        assert_eq!(ring.get("x"), Some("A"));

        // Removing "A" must not take "B"'s position with it.
        ring.remove("A");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.get("x"), Some("B"));
    }

    #[test]
    fn virtualization_balances_the_key_distribution() {
        use rand::distributions::Alphanumeric;
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut ring = HashRing::new(50);
        ring.add(&["A", "B", "C"]);

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut shares: HashMap<String, usize> = HashMap::new();
        let samples = 10_000;

        for _ in 0..samples {
            let key: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();
            *shares.entry(ring.get(&key).unwrap().to_owned()).or_insert(0) += 1;
        }

        assert_eq!(shares.len(), 3);
        for (peer, count) in shares {
            let share = count as f64 / samples as f64;
            assert!(
                (0.25..=0.42).contains(&share),
                "peer {} received an unbalanced share of {:.3}",
                peer,
                share
            );
        }
    }
}
