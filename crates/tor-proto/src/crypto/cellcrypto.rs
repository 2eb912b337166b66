//! Per-hop onion-cell encryption: AES-128-CTR plus a running SHA-1 digest
//! in each direction, one pair of ciphers per circuit hop.
//!
//! Grounded on the shape of the teacher's `crypto/cell.rs`
//! (`OutboundClientCrypt`/`InboundClientCrypt`, each a stack of per-hop
//! layers that is encrypted/decrypted through in order), but with the
//! `dyn Box<dyn ClientLayer>` dispatch collapsed to a concrete
//! `Vec<HopCrypto>`: this client only ever runs one crypto variant
//! (AES-128-CTR / SHA-1), so there is nothing left to dispatch over.

use cipher::{KeyIvInit, StreamCipher};
use digest::Digest;
use subtle::ConstantTimeEq;
use tor_cell::chancell::CELL_DATA_LEN;
use tor_cell::relaycell::RelayCellFields;
use tor_llcrypto::cipher::aes::Aes128Ctr;
use tor_llcrypto::d::Sha1;

use crate::crypto::handshake::NtorKeys;
use crate::err::Result;

/// Per-hop crypto state: one AES-128-CTR stream and one running SHA-1
/// digest for each direction.
struct HopCrypto {
    forward_cipher: Aes128Ctr,
    backward_cipher: Aes128Ctr,
    forward_digest: Sha1,
    backward_digest: Sha1,
}

impl HopCrypto {
    fn new(keys: &NtorKeys) -> Self {
        let forward_cipher = Aes128Ctr::new(&keys.kf.into(), &[0u8; 16].into());
        let backward_cipher = Aes128Ctr::new(&keys.kb.into(), &[0u8; 16].into());
        let mut forward_digest = Sha1::new();
        forward_digest.update(keys.df);
        let mut backward_digest = Sha1::new();
        backward_digest.update(keys.db);
        HopCrypto {
            forward_cipher,
            backward_cipher,
            forward_digest,
            backward_digest,
        }
    }
}

/// The outbound (client-to-relay) crypto stack for an entire circuit.
pub struct OutboundCrypt {
    hops: Vec<HopCrypto>,
}

impl OutboundCrypt {
    /// Construct an empty stack, before any hop has been added.
    pub fn new() -> Self {
        OutboundCrypt { hops: Vec::new() }
    }

    /// Install the next hop's keys, extending the circuit by one layer.
    pub fn add_hop(&mut self, keys: &NtorKeys) {
        self.hops.push(HopCrypto::new(keys));
    }

    /// The number of hops currently installed.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Onion-wrap `cell` for hop `target` (0-based): stamp its digest
    /// against that hop's forward digest, encrypt with that hop's Kf, then
    /// successively encrypt with each earlier hop's Kf.
    pub fn encrypt(&mut self, target: usize, mut cell: RelayCellFields) -> Result<[u8; CELL_DATA_LEN]> {
        cell.recognized = 0;
        cell.digest = [0; 4];
        let tentative = cell.encode()?;

        let hop = &mut self.hops[target];
        let mut peek = hop.forward_digest.clone();
        peek.update(&tentative);
        let digest = peek.finalize();
        cell.digest.copy_from_slice(&digest[..4]);
        hop.forward_digest.update(&tentative);

        let mut buf = cell.encode()?;
        for i in (0..=target).rev() {
            self.hops[i].forward_cipher.apply_keystream(&mut buf);
        }
        Ok(buf)
    }
}

impl Default for OutboundCrypt {
    fn default() -> Self {
        Self::new()
    }
}

/// The inbound (relay-to-client) crypto stack for an entire circuit.
pub struct InboundCrypt {
    hops: Vec<HopCrypto>,
}

impl InboundCrypt {
    /// Construct an empty stack, before any hop has been added.
    pub fn new() -> Self {
        InboundCrypt { hops: Vec::new() }
    }

    /// Install the next hop's keys, extending the circuit by one layer.
    pub fn add_hop(&mut self, keys: &NtorKeys) {
        self.hops.push(HopCrypto::new(keys));
    }

    /// The number of hops currently installed.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Onion-unwrap an inbound `RELAY`/`RELAY_EARLY` cell's raw payload,
    /// decrypting hop by hop until one recognizes it.
    ///
    /// Returns the owning hop's index and the decoded fields, or `None` if
    /// no hop recognized the cell (every hop's cipher is still run, to
    /// keep every keystream in lockstep with the sender regardless of
    /// which hop the cell turns out to belong to).
    pub fn decrypt(&mut self, mut buf: [u8; CELL_DATA_LEN]) -> Option<(usize, RelayCellFields)> {
        for i in 0..self.hops.len() {
            self.hops[i].backward_cipher.apply_keystream(&mut buf);

            let fields = match RelayCellFields::decode(&buf) {
                Ok(f) => f,
                Err(_) => continue,
            };
            if !fields.is_recognized() {
                continue;
            }
            let mut tentative = fields.clone();
            tentative.digest = [0; 4];
            let tentative_bytes = match tentative.encode() {
                Ok(b) => b,
                Err(_) => continue,
            };

            let hop = &mut self.hops[i];
            let mut peek = hop.backward_digest.clone();
            peek.update(&tentative_bytes);
            let digest = peek.finalize();
            if digest[..4].ct_eq(&fields.digest[..]).unwrap_u8() == 1 {
                hop.backward_digest.update(&tentative_bytes);
                return Some((i, fields));
            }
        }
        None
    }
}

impl Default for InboundCrypt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tor_cell::relaycell::{RelayCmd, StreamId};

    fn keys(seed: u8) -> NtorKeys {
        NtorKeys {
            df: [seed; 20],
            db: [seed.wrapping_add(1); 20],
            kf: [seed.wrapping_add(2); 16],
            kb: [seed.wrapping_add(3); 16],
        }
    }

    #[test]
    fn first_hop_recognizes_its_own_cell() {
        let mut out = OutboundCrypt::new();
        out.add_hop(&keys(1));
        out.add_hop(&keys(2));

        let mut inb = InboundCrypt::new();
        inb.add_hop(&keys(1));
        inb.add_hop(&keys(2));

        let cell = RelayCellFields::new(RelayCmd::DATA, StreamId::new(3), b"hi".to_vec()).unwrap();
        let wire = out.encrypt(0, cell).unwrap();

        let (hop, fields) = inb.decrypt(wire).expect("hop 0 recognizes its own cell");
        assert_eq!(hop, 0);
        assert_eq!(fields.data, b"hi");
    }

    #[test]
    fn second_hop_cell_is_not_recognized_by_first() {
        let mut out = OutboundCrypt::new();
        out.add_hop(&keys(1));
        out.add_hop(&keys(2));

        let mut inb_first_only = InboundCrypt::new();
        inb_first_only.add_hop(&keys(1));

        let cell = RelayCellFields::new(RelayCmd::DATA, StreamId::new(3), b"hi".to_vec()).unwrap();
        let wire = out.encrypt(1, cell).unwrap();

        assert!(inb_first_only.decrypt(wire).is_none());
    }
}
