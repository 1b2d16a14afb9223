//! tss-esapi adapter: the real TPM 2.0 command channel.
//!
//! Handle discipline: every ESAPI object or session handed out crosses the
//! port boundary as an opaque [`TransientHandle`]; the mapping back to the
//! native handle lives in this file only. The storage root template is
//! fixed, so the primary re-derives to the same key on the same TPM every
//! run and nothing is ever persisted in NVRAM.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;
use tss_esapi::{
    attributes::ObjectAttributesBuilder,
    constants::{
        tss::{TPM2_RH_NULL, TPM2_ST_HASHCHECK},
        SessionType,
    },
    handles::{KeyHandle, ObjectHandle, SessionHandle},
    interface_types::{
        algorithm::{HashingAlgorithm, PublicAlgorithm},
        ecc::EccCurve,
        resource_handles::Hierarchy,
        session_handles::{AuthSession, PolicySession},
    },
    structures::{
        Digest, EccPoint, EccScheme, HashScheme, HashcheckTicket, KeyDerivationFunctionScheme,
        PcrSelectionList, PcrSelectionListBuilder, PcrSlot, Private, Public, PublicBuilder,
        PublicEccParametersBuilder, Signature, SignatureScheme, SymmetricDefinitionObject,
    },
    tcti_ldr::TctiNameConf,
    traits::{Marshall, UnMarshall},
    tss2_esys::TPMT_TK_HASHCHECK,
    Context,
};

use crate::error::DeviceError;
use crate::model::{PcrBank, PcrSelection};
use crate::ports::{
    DeviceOpener, EcPublicArea, KeyBlobs, KeyCurve, RawEcdsaSignature, SessionKind, TpmDevice,
    TransientHandle,
};

/// Opens the kernel TPM character device (e.g. `/dev/tpmrm0`).
pub struct TssOpener;

impl DeviceOpener for TssOpener {
    type Device = TssDevice;

    fn open(&self, path: &Path) -> Result<TssDevice, DeviceError> {
        let unavailable = |reason: String| DeviceError::Unavailable {
            path: path.display().to_string(),
            reason,
        };

        let tcti = TctiNameConf::from_str(&format!("device:{}", path.display()))
            .map_err(|err| unavailable(err.to_string()))?;
        let ctx = Context::new(tcti).map_err(|err| unavailable(err.to_string()))?;
        debug!(path = %path.display(), "ESAPI context created");

        Ok(TssDevice {
            ctx,
            entries: HashMap::new(),
            next_id: 1,
        })
    }
}

enum TssEntry {
    Object(ObjectHandle),
    Session(AuthSession),
}

pub struct TssDevice {
    ctx: Context,
    entries: HashMap<u32, TssEntry>,
    next_id: u32,
}

impl TssDevice {
    fn insert(&mut self, entry: TssEntry) -> TransientHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(id, entry);
        TransientHandle(id)
    }

    fn object(&self, handle: TransientHandle) -> Result<ObjectHandle, DeviceError> {
        match self.entries.get(&handle.0) {
            Some(TssEntry::Object(object)) => Ok(*object),
            _ => Err(stale(handle)),
        }
    }

    fn session(&self, handle: TransientHandle) -> Result<AuthSession, DeviceError> {
        match self.entries.get(&handle.0) {
            Some(TssEntry::Session(session)) => Ok(*session),
            _ => Err(stale(handle)),
        }
    }
}

impl TpmDevice for TssDevice {
    fn create_primary(&mut self) -> Result<TransientHandle, DeviceError> {
        let public = storage_root_template()?;
        let result = self
            .ctx
            .execute_with_nullauth_session(|ctx| {
                ctx.create_primary(Hierarchy::Owner, public, None, None, None, None)
            })
            .map_err(|err| command("create_primary", err))?;
        Ok(self.insert(TssEntry::Object(result.key_handle.into())))
    }

    fn start_policy_session(
        &mut self,
        kind: SessionKind,
        selection: &PcrSelection,
    ) -> Result<TransientHandle, DeviceError> {
        let session_type = match kind {
            SessionKind::Trial => SessionType::Trial,
            SessionKind::Policy => SessionType::Policy,
        };
        let session = self
            .ctx
            .start_auth_session(
                None,
                None,
                None,
                session_type,
                SymmetricDefinitionObject::AES_128_CFB.into(),
                HashingAlgorithm::Sha256,
            )
            .map_err(|err| command("start_auth_session", err))?
            .ok_or(DeviceError::CommandFailed {
                command: "start_auth_session",
                reason: "TPM returned no session handle".to_string(),
            })?;

        let policy_session = PolicySession::try_from(session)
            .map_err(|err| command("start_auth_session", err))?;
        self.ctx
            .policy_pcr(policy_session, Digest::default(), selection_list(selection)?)
            .map_err(|err| command("policy_pcr", err))?;

        Ok(self.insert(TssEntry::Session(session)))
    }

    fn policy_digest(&mut self, session: TransientHandle) -> Result<Vec<u8>, DeviceError> {
        let session = self.session(session)?;
        let policy_session = PolicySession::try_from(session)
            .map_err(|err| command("policy_get_digest", err))?;
        let digest = self
            .ctx
            .policy_get_digest(policy_session)
            .map_err(|err| command("policy_get_digest", err))?;
        Ok(digest.value().to_vec())
    }

    fn create_key(
        &mut self,
        parent: TransientHandle,
        auth_policy: &[u8],
    ) -> Result<KeyBlobs, DeviceError> {
        let parent: KeyHandle = self.object(parent)?.into();
        let public = signing_key_template(auth_policy)?;
        let result = self
            .ctx
            .execute_with_nullauth_session(|ctx| ctx.create(parent, public, None, None, None, None))
            .map_err(|err| command("create", err))?;

        let public = result
            .out_public
            .marshall()
            .map_err(|err| command("create", err))?;
        let private = result.out_private.to_vec();
        Ok(KeyBlobs { public, private })
    }

    fn load_key(
        &mut self,
        parent: TransientHandle,
        blobs: &KeyBlobs,
    ) -> Result<TransientHandle, DeviceError> {
        let parent: KeyHandle = self.object(parent)?.into();
        let public = Public::unmarshall(&blobs.public).map_err(|err| command("load", err))?;
        let private =
            Private::try_from(blobs.private.clone()).map_err(|err| command("load", err))?;
        let key = self
            .ctx
            .execute_with_nullauth_session(|ctx| ctx.load(parent, private, public))
            .map_err(|err| command("load", err))?;
        Ok(self.insert(TssEntry::Object(key.into())))
    }

    fn read_public(&mut self, key: TransientHandle) -> Result<EcPublicArea, DeviceError> {
        let key: KeyHandle = self.object(key)?.into();
        let (public, _, _) = self
            .ctx
            .read_public(key)
            .map_err(|err| command("read_public", err))?;

        match public {
            Public::Ecc {
                parameters,
                unique,
                auth_policy,
                ..
            } => {
                let curve = match parameters.ecc_curve() {
                    EccCurve::NistP256 => KeyCurve::NistP256,
                    other => KeyCurve::Unsupported(format!("{other:?}")),
                };
                Ok(EcPublicArea {
                    curve,
                    x: unique.x().value().to_vec(),
                    y: unique.y().value().to_vec(),
                    auth_policy: auth_policy.value().to_vec(),
                })
            }
            _ => Err(DeviceError::CommandFailed {
                command: "read_public",
                reason: "loaded key is not an ECC key".to_string(),
            }),
        }
    }

    fn sign_digest(
        &mut self,
        key: TransientHandle,
        session: TransientHandle,
        digest: &[u8; 32],
    ) -> Result<RawEcdsaSignature, DeviceError> {
        let key: KeyHandle = self.object(key)?.into();
        let session = self.session(session)?;
        let digest =
            Digest::try_from(digest.as_slice()).map_err(|err| command("sign", err))?;
        let scheme = SignatureScheme::EcDsa {
            hash_scheme: HashScheme::new(HashingAlgorithm::Sha256),
        };

        let validation = HashcheckTicket::try_from(TPMT_TK_HASHCHECK {
            tag: TPM2_ST_HASHCHECK,
            hierarchy: TPM2_RH_NULL,
            digest: Default::default(),
        })
        .map_err(|err| command("sign", err))?;

        let signature = self
            .ctx
            .execute_with_session(Some(session), |ctx| {
                ctx.sign(key, digest, scheme, validation)
            })
            .map_err(|err| command("sign", err))?;

        match signature {
            Signature::EcDsa(ecdsa) => Ok(RawEcdsaSignature {
                r: ecdsa.signature_r().value().to_vec(),
                s: ecdsa.signature_s().value().to_vec(),
            }),
            other => Err(DeviceError::CommandFailed {
                command: "sign",
                reason: format!("unexpected signature type {other:?}"),
            }),
        }
    }

    fn flush(&mut self, handle: TransientHandle) -> Result<(), DeviceError> {
        match self.entries.remove(&handle.0) {
            Some(TssEntry::Object(object)) => self
                .ctx
                .flush_context(object)
                .map_err(|err| command("flush_context", err)),
            Some(TssEntry::Session(session)) => self
                .ctx
                .flush_context(SessionHandle::from(session).into())
                .map_err(|err| command("flush_context", err)),
            None => Err(stale(handle)),
        }
    }
}

fn command(command: &'static str, err: tss_esapi::Error) -> DeviceError {
    DeviceError::CommandFailed {
        command,
        reason: err.to_string(),
    }
}

fn stale(handle: TransientHandle) -> DeviceError {
    DeviceError::CommandFailed {
        command: "handle_lookup",
        reason: format!("unknown transient handle {handle}"),
    }
}

/// Restricted ECC storage decryption key, empty auth. The template is the
/// only identity the root has: same template + same TPM = same root.
fn storage_root_template() -> Result<Public, DeviceError> {
    let build_failed = |err: tss_esapi::Error| command("create_primary", err);

    let attributes = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_user_with_auth(true)
        .with_decrypt(true)
        .with_restricted(true)
        .build()
        .map_err(build_failed)?;

    let ecc_parameters = PublicEccParametersBuilder::new()
        .with_ecc_scheme(EccScheme::Null)
        .with_curve(EccCurve::NistP256)
        .with_key_derivation_function_scheme(KeyDerivationFunctionScheme::Null)
        .with_symmetric(SymmetricDefinitionObject::AES_128_CFB)
        .build()
        .map_err(build_failed)?;

    PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attributes)
        .with_ecc_parameters(ecc_parameters)
        .with_ecc_unique_identifier(EccPoint::default())
        .build()
        .map_err(build_failed)
}

/// Sign-only ECDSA/SHA-256 key on P-256. userWithAuth stays false: the only
/// way to authorize this key is the PCR policy sealed into `auth_policy`.
fn signing_key_template(auth_policy: &[u8]) -> Result<Public, DeviceError> {
    let build_failed = |err: tss_esapi::Error| command("create", err);

    let attributes = ObjectAttributesBuilder::new()
        .with_fixed_tpm(true)
        .with_fixed_parent(true)
        .with_sensitive_data_origin(true)
        .with_sign_encrypt(true)
        .build()
        .map_err(build_failed)?;

    let ecc_parameters = PublicEccParametersBuilder::new()
        .with_ecc_scheme(EccScheme::EcDsa(HashScheme::new(HashingAlgorithm::Sha256)))
        .with_curve(EccCurve::NistP256)
        .with_key_derivation_function_scheme(KeyDerivationFunctionScheme::Null)
        .with_symmetric(SymmetricDefinitionObject::Null)
        .build()
        .map_err(build_failed)?;

    let auth_policy =
        Digest::try_from(auth_policy.to_vec()).map_err(build_failed)?;

    PublicBuilder::new()
        .with_public_algorithm(PublicAlgorithm::Ecc)
        .with_name_hashing_algorithm(HashingAlgorithm::Sha256)
        .with_object_attributes(attributes)
        .with_ecc_parameters(ecc_parameters)
        .with_ecc_unique_identifier(EccPoint::default())
        .with_auth_policy(auth_policy)
        .build()
        .map_err(build_failed)
}

fn selection_list(selection: &PcrSelection) -> Result<PcrSelectionList, DeviceError> {
    let bank = match selection.bank() {
        PcrBank::Sha256 => HashingAlgorithm::Sha256,
    };
    let slots: Vec<PcrSlot> = selection
        .indices()
        .map(pcr_slot)
        .collect::<Result<_, _>>()?;
    PcrSelectionListBuilder::new()
        .with_selection(bank, &slots)
        .build()
        .map_err(|err| command("policy_pcr", err))
}

fn pcr_slot(index: u32) -> Result<PcrSlot, DeviceError> {
    let slot = match index {
        0 => PcrSlot::Slot0,
        1 => PcrSlot::Slot1,
        2 => PcrSlot::Slot2,
        3 => PcrSlot::Slot3,
        4 => PcrSlot::Slot4,
        5 => PcrSlot::Slot5,
        6 => PcrSlot::Slot6,
        7 => PcrSlot::Slot7,
        8 => PcrSlot::Slot8,
        9 => PcrSlot::Slot9,
        10 => PcrSlot::Slot10,
        11 => PcrSlot::Slot11,
        12 => PcrSlot::Slot12,
        13 => PcrSlot::Slot13,
        14 => PcrSlot::Slot14,
        15 => PcrSlot::Slot15,
        16 => PcrSlot::Slot16,
        17 => PcrSlot::Slot17,
        18 => PcrSlot::Slot18,
        19 => PcrSlot::Slot19,
        20 => PcrSlot::Slot20,
        21 => PcrSlot::Slot21,
        22 => PcrSlot::Slot22,
        23 => PcrSlot::Slot23,
        other => {
            return Err(DeviceError::CommandFailed {
                command: "policy_pcr",
                reason: format!("PCR index {other} outside the SHA-256 bank"),
            })
        }
    };
    Ok(slot)
}
