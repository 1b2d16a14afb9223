//! In-memory software TPM for tests.
//!
//! Models the behavior the use cases depend on: 24 SHA-256 PCR registers,
//! trial and real policy sessions with a PCR-bound digest, key wrapping
//! under a per-device seed, and the policy check plus single-use rule at
//! sign time. Clones share state, so a test can keep a probe handle while
//! a [`crate::Connection`] owns the device.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use sha2::{Digest, Sha256};

use crate::error::DeviceError;
use crate::model::PcrSelection;
use crate::ports::{
    DeviceOpener, EcPublicArea, KeyBlobs, KeyCurve, RawEcdsaSignature, SessionKind, TpmDevice,
    TransientHandle,
};

const PCR_COUNT: u32 = 24;
const WRAP_SEED: [u8; 32] = [0x5a; 32];

#[derive(Clone, Debug)]
pub struct FakeTpm {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
struct State {
    pcrs: HashMap<u32, [u8; 32]>,
    entries: HashMap<u32, Entry>,
    next_id: u32,
}

#[derive(Debug)]
enum Entry {
    StorageRoot,
    Session {
        kind: SessionKind,
        digest: [u8; 32],
        consumed: bool,
    },
    Key {
        signing: SigningKey,
        auth_policy: [u8; 32],
    },
}

impl FakeTpm {
    pub fn new() -> Self {
        let mut pcrs = HashMap::new();
        for index in 0..PCR_COUNT {
            pcrs.insert(index, Sha256::digest([index as u8]).into());
        }
        Self {
            state: Arc::new(Mutex::new(State {
                pcrs,
                entries: HashMap::new(),
                next_id: 1,
            })),
        }
    }

    /// Extend a PCR the way a boot component measurement would.
    pub fn extend_pcr(&mut self, index: u32, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        let current = state.pcrs[&index];
        let mut hasher = Sha256::new();
        hasher.update(current);
        hasher.update(data);
        state.pcrs.insert(index, hasher.finalize().into());
    }

    /// Number of objects and sessions currently resident.
    pub fn open_handle_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }
}

impl Default for FakeTpm {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn insert(&mut self, entry: Entry) -> TransientHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, entry);
        TransientHandle(id)
    }

    fn pcr_policy_digest(&self, selection: &PcrSelection) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"TPM2_PolicyPCR");
        for index in selection.indices() {
            hasher.update(index.to_be_bytes());
            hasher.update(self.pcrs[&index]);
        }
        hasher.finalize().into()
    }
}

fn failed(command: &'static str, reason: impl Into<String>) -> DeviceError {
    DeviceError::CommandFailed {
        command,
        reason: reason.into(),
    }
}

fn wrap(scalar: &[u8; 32]) -> Vec<u8> {
    scalar
        .iter()
        .zip(WRAP_SEED.iter())
        .map(|(byte, seed)| byte ^ seed)
        .collect()
}

impl TpmDevice for FakeTpm {
    fn create_primary(&mut self) -> Result<TransientHandle, DeviceError> {
        let mut state = self.state.lock().unwrap();
        Ok(state.insert(Entry::StorageRoot))
    }

    fn start_policy_session(
        &mut self,
        kind: SessionKind,
        selection: &PcrSelection,
    ) -> Result<TransientHandle, DeviceError> {
        let mut state = self.state.lock().unwrap();
        let digest = state.pcr_policy_digest(selection);
        Ok(state.insert(Entry::Session {
            kind,
            digest,
            consumed: false,
        }))
    }

    fn policy_digest(&mut self, session: TransientHandle) -> Result<Vec<u8>, DeviceError> {
        let state = self.state.lock().unwrap();
        match state.entries.get(&session.0) {
            Some(Entry::Session { digest, .. }) => Ok(digest.to_vec()),
            _ => Err(failed("policy_get_digest", "not a session handle")),
        }
    }

    fn create_key(
        &mut self,
        parent: TransientHandle,
        auth_policy: &[u8],
    ) -> Result<KeyBlobs, DeviceError> {
        let state = self.state.lock().unwrap();
        match state.entries.get(&parent.0) {
            Some(Entry::StorageRoot) => {}
            _ => return Err(failed("create", "parent is not a storage root")),
        }
        let auth_policy: [u8; 32] = auth_policy
            .try_into()
            .map_err(|_| failed("create", "auth policy is not a SHA-256 digest"))?;

        // Key material is derived, not random, so re-creation in a test is
        // still unique per handle counter.
        let mut hasher = Sha256::new();
        hasher.update(state.next_id.to_be_bytes());
        hasher.update(auth_policy);
        let seed: [u8; 32] = hasher.finalize().into();
        let signing = SigningKey::from_bytes(&seed.into())
            .map_err(|err| failed("create", err.to_string()))?;

        let scalar: [u8; 32] = signing.to_bytes().into();
        let point = signing.verifying_key().to_encoded_point(false);

        let mut public = Vec::with_capacity(32 + 65);
        public.extend_from_slice(&auth_policy);
        public.extend_from_slice(point.as_bytes());

        Ok(KeyBlobs {
            public,
            private: wrap(&scalar),
        })
    }

    fn load_key(
        &mut self,
        parent: TransientHandle,
        blobs: &KeyBlobs,
    ) -> Result<TransientHandle, DeviceError> {
        let mut state = self.state.lock().unwrap();
        match state.entries.get(&parent.0) {
            Some(Entry::StorageRoot) => {}
            _ => return Err(failed("load", "parent is not a storage root")),
        }
        if blobs.public.len() != 32 + 65 || blobs.private.len() != 32 {
            return Err(failed("load", "malformed key blob"));
        }

        let auth_policy: [u8; 32] = blobs.public[..32].try_into().unwrap();
        let wrapped: [u8; 32] = blobs.private.as_slice().try_into().unwrap();
        let scalar: [u8; 32] = wrap(&wrapped).try_into().unwrap();
        let signing = SigningKey::from_bytes(&scalar.into())
            .map_err(|err| failed("load", err.to_string()))?;

        // Integrity check: the wrapped private half must belong to the
        // public half, otherwise the blob pair was tampered with.
        if signing.verifying_key().to_encoded_point(false).as_bytes() != &blobs.public[32..] {
            return Err(failed("load", "integrity check failed (TPM_RC_INTEGRITY)"));
        }

        Ok(state.insert(Entry::Key {
            signing,
            auth_policy,
        }))
    }

    fn read_public(&mut self, key: TransientHandle) -> Result<EcPublicArea, DeviceError> {
        let state = self.state.lock().unwrap();
        match state.entries.get(&key.0) {
            Some(Entry::Key {
                signing,
                auth_policy,
            }) => {
                let point = signing.verifying_key().to_encoded_point(false);
                Ok(EcPublicArea {
                    curve: KeyCurve::NistP256,
                    x: point.x().unwrap().to_vec(),
                    y: point.y().unwrap().to_vec(),
                    auth_policy: auth_policy.to_vec(),
                })
            }
            _ => Err(failed("read_public", "not a key handle")),
        }
    }

    fn sign_digest(
        &mut self,
        key: TransientHandle,
        session: TransientHandle,
        digest: &[u8; 32],
    ) -> Result<RawEcdsaSignature, DeviceError> {
        let mut state = self.state.lock().unwrap();

        let auth_policy = match state.entries.get(&key.0) {
            Some(Entry::Key { auth_policy, .. }) => *auth_policy,
            _ => return Err(failed("sign", "not a key handle")),
        };
        match state.entries.get_mut(&session.0) {
            Some(Entry::Session {
                kind,
                digest: session_digest,
                consumed,
            }) => {
                if *kind != SessionKind::Policy {
                    return Err(failed("sign", "trial sessions cannot authorize"));
                }
                if *consumed {
                    return Err(failed("sign", "policy session already used"));
                }
                if *session_digest != auth_policy {
                    return Err(failed("sign", "policy check failed (TPM_RC_POLICY_FAIL)"));
                }
                *consumed = true;
            }
            _ => return Err(failed("sign", "not a session handle")),
        }

        let signing = match state.entries.get(&key.0) {
            Some(Entry::Key { signing, .. }) => signing,
            _ => unreachable!(),
        };
        let signature: Signature = signing
            .sign_prehash(digest)
            .map_err(|err| failed("sign", err.to_string()))?;
        let (r, s) = signature.split_bytes();
        Ok(RawEcdsaSignature {
            r: r.to_vec(),
            s: s.to_vec(),
        })
    }

    fn flush(&mut self, handle: TransientHandle) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        match state.entries.remove(&handle.0) {
            Some(_) => Ok(()),
            None => Err(failed("flush_context", "handle not resident")),
        }
    }
}

/// Opener that hands out clones of a pre-built fake, or fails to simulate a
/// missing device node.
pub struct FakeOpener {
    pub device: Option<FakeTpm>,
}

impl DeviceOpener for FakeOpener {
    type Device = FakeTpm;

    fn open(&self, path: &Path) -> Result<FakeTpm, DeviceError> {
        match &self.device {
            Some(device) => Ok(device.clone()),
            None => Err(DeviceError::Unavailable {
                path: path.display().to_string(),
                reason: "no such device".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> PcrSelection {
        "0,2,4,8,9".parse().unwrap()
    }

    fn policy_for(device: &mut FakeTpm, selection: &PcrSelection) -> Vec<u8> {
        let session = device
            .start_policy_session(SessionKind::Trial, selection)
            .unwrap();
        let digest = device.policy_digest(session).unwrap();
        device.flush(session).unwrap();
        digest
    }

    #[test]
    fn test_policy_session_is_single_use() {
        let mut device = FakeTpm::new();
        let root = device.create_primary().unwrap();
        let policy = policy_for(&mut device, &selection());
        let blobs = device.create_key(root, &policy).unwrap();
        let key = device.load_key(root, &blobs).unwrap();

        let session = device
            .start_policy_session(SessionKind::Policy, &selection())
            .unwrap();
        assert!(device.sign_digest(key, session, &[7; 32]).is_ok());
        assert!(device.sign_digest(key, session, &[7; 32]).is_err());
    }

    #[test]
    fn test_trial_session_cannot_authorize_signing() {
        let mut device = FakeTpm::new();
        let root = device.create_primary().unwrap();
        let policy = policy_for(&mut device, &selection());
        let blobs = device.create_key(root, &policy).unwrap();
        let key = device.load_key(root, &blobs).unwrap();

        let trial = device
            .start_policy_session(SessionKind::Trial, &selection())
            .unwrap();
        assert!(device.sign_digest(key, trial, &[7; 32]).is_err());
    }

    #[test]
    fn test_tampered_private_blob_fails_load() {
        let mut device = FakeTpm::new();
        let root = device.create_primary().unwrap();
        let policy = policy_for(&mut device, &selection());
        let mut blobs = device.create_key(root, &policy).unwrap();
        blobs.private[0] ^= 0xff;
        assert!(device.load_key(root, &blobs).is_err());
    }

    #[test]
    fn test_extend_changes_policy_digest() {
        let mut device = FakeTpm::new();
        let before = policy_for(&mut device, &selection());
        device.extend_pcr(8, b"initrd");
        let after = policy_for(&mut device, &selection());
        assert_ne!(before, after);
    }

    #[test]
    fn test_signing_after_pcr_change_is_refused() {
        let mut device = FakeTpm::new();
        let root = device.create_primary().unwrap();
        let policy = policy_for(&mut device, &selection());
        let blobs = device.create_key(root, &policy).unwrap();
        let key = device.load_key(root, &blobs).unwrap();

        device.extend_pcr(0, b"firmware update");
        let session = device
            .start_policy_session(SessionKind::Policy, &selection())
            .unwrap();
        let err = device.sign_digest(key, session, &[7; 32]).unwrap_err();
        assert!(err.to_string().contains("TPM_RC_POLICY_FAIL"));
    }
}
