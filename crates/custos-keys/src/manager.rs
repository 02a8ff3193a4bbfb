//! Key lifecycle management.
//!
//! The [`KeyManager`] owns the key ring: every key of every purpose plus the
//! map of which key is active per purpose. One `RwLock` guards both, so a
//! reader never observes a purpose with zero or two active keys.
//!
//! Every state change is computed on clones, sealed and persisted in one
//! batch, and only then applied to the ring. A failed write therefore leaves
//! memory exactly as it was.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use custos_core::{KeyPurpose, Timestamp};
use custos_crypto::{PBKDF2_ITERATIONS, Secret32};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{KeyError, KeyResult};
use crate::export::{KeyExport, check_password};
use crate::key::{EncryptionKey, KeyEvent, KeyEventKind, KeyId, KeyStatus};
use crate::policy::{PolicySet, RotationPolicy};
use crate::store::{KeyRecord, KeyStore};

#[derive(Default)]
struct KeyRing {
    keys: HashMap<KeyId, EncryptionKey>,
    active: HashMap<KeyPurpose, KeyId>,
    /// Keys whose usage counters changed since the last write.
    dirty: HashSet<KeyId>,
}

impl KeyRing {
    fn active_key(&self, purpose: KeyPurpose) -> Option<&EncryptionKey> {
        self.active.get(&purpose).and_then(|id| self.keys.get(id))
    }

    fn next_version(&self, purpose: KeyPurpose) -> u32 {
        self.keys
            .values()
            .filter(|k| k.purpose == purpose)
            .map(|k| k.version)
            .max()
            .unwrap_or(0)
            .saturating_add(1)
    }

    fn apply(&mut self, changed: Vec<EncryptionKey>) {
        for key in changed {
            if key.is_active {
                self.active.insert(key.purpose, key.id);
            } else if self.active.get(&key.purpose) == Some(&key.id) {
                self.active.remove(&key.purpose);
            }
            self.dirty.remove(&key.id);
            self.keys.insert(key.id, key);
        }
    }

    fn keys_of(&self, purpose: KeyPurpose) -> impl Iterator<Item = &EncryptionKey> {
        self.keys.values().filter(move |k| k.purpose == purpose)
    }
}

/// Seal and write `changed` plus any keys with unsaved usage counters.
///
/// On success the ring is updated; on failure it is untouched.
fn commit(
    store: &dyn KeyStore,
    kek: &Secret32,
    ring: &mut KeyRing,
    mut changed: Vec<EncryptionKey>,
) -> KeyResult<()> {
    let pending: Vec<KeyId> = ring
        .dirty
        .iter()
        .filter(|id| !changed.iter().any(|k| k.id == **id))
        .copied()
        .collect();
    for id in pending {
        if let Some(key) = ring.keys.get(&id) {
            changed.push(key.clone());
        }
    }

    let records = changed
        .iter()
        .map(|k| KeyRecord::seal(k, kek))
        .collect::<KeyResult<Vec<_>>>()?;
    store.save_batch(&records)?;
    ring.apply(changed);
    Ok(())
}

/// Status of `key` with its due time taken from the policy in force.
fn status_under(key: &EncryptionKey, policy: &RotationPolicy) -> KeyStatus {
    KeyStatus {
        expires_at: policy.rotation_due_at(key.created_at),
        ..key.status()
    }
}

/// Per-purpose key statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurposeMetrics {
    /// Purpose.
    pub purpose: KeyPurpose,
    /// Active key ID.
    pub active_key_id: Option<KeyId>,
    /// Active key version.
    pub active_version: Option<u32>,
    /// Whole days since the active key was created.
    pub active_age_days: Option<i64>,
    /// Whole days until the active key is due (negative when overdue).
    pub days_until_expiry: Option<i64>,
    /// Encryptions performed with the active key.
    pub usage_count: u64,
    /// Inactive keys still holding material.
    pub inactive_keys: usize,
    /// Keys whose material was purged.
    pub purged_keys: usize,
}

/// Snapshot of the whole key ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetrics {
    /// When the snapshot was taken.
    pub generated_at: Timestamp,
    /// One entry per purpose.
    pub purposes: Vec<PurposeMetrics>,
}

/// Symmetric key lifecycle manager.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    kek: Secret32,
    ring: RwLock<KeyRing>,
    policies: RwLock<PolicySet>,
    export_iterations: u32,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("kek", &self.kek)
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Load the key ring from `store` and make sure every purpose has exactly
    /// one active key.
    ///
    /// - Two active keys for one purpose (a crash mid-rotation): the highest
    ///   version stays active, the others are deactivated and persisted.
    /// - No active key: a fresh key is generated and activated.
    ///
    /// `policies` are the configured defaults. A policy saved earlier through
    /// [`update_policy`](Self::update_policy) replaces the default for its
    /// purpose.
    ///
    /// # Errors
    ///
    /// - [`KeyError::InvalidPolicy`] if a policy is inconsistent
    /// - [`KeyError::Crypto`] if `kek` does not open the stored material
    /// - [`KeyError::PersistenceFailure`] if the store cannot be read or written
    pub fn open(store: Arc<dyn KeyStore>, policies: PolicySet, kek: Secret32) -> KeyResult<Self> {
        policies.validate()?;
        let mut policies = policies;
        for stored in store.load_policies()? {
            debug!(purpose = %stored.purpose, "Using stored rotation policy");
            policies.set(stored)?;
        }

        let mut ring = KeyRing::default();
        for record in store.load_all()? {
            let key = record.unseal(&kek)?;
            ring.keys.insert(key.id, key);
        }
        let loaded = ring.keys.len();

        let mut changed = Vec::new();
        for purpose in KeyPurpose::ALL {
            let mut actives: Vec<(u32, KeyId)> = ring
                .keys_of(purpose)
                .filter(|k| k.is_active && !k.is_purged())
                .map(|k| (k.version, k.id))
                .collect();
            actives.sort_unstable_by(|a, b| b.cmp(a));

            match actives.split_first() {
                Some((&(_, winner), losers)) => {
                    ring.active.insert(purpose, winner);
                    for &(version, id) in losers {
                        warn!(%purpose, key_id = %id, version, "Repairing second active key");
                        if let Some(key) = ring.keys.get(&id) {
                            let mut key = key.clone();
                            key.deactivate(None, "repaired: newer active key present");
                            changed.push(key);
                        }
                    }
                },
                None => {
                    let policy = policies.get(purpose);
                    let mut key = EncryptionKey::generate(
                        purpose,
                        ring.next_version(purpose),
                        policy.rotation_interval_days,
                    );
                    key.activate(None);
                    info!(%purpose, key_id = %key.id, version = key.version, "Generated initial key");
                    changed.push(key);
                },
            }
        }

        if !changed.is_empty() {
            commit(store.as_ref(), &kek, &mut ring, changed)?;
        }
        info!(loaded, "Key manager opened");

        Ok(Self {
            store,
            kek,
            ring: RwLock::new(ring),
            policies: RwLock::new(policies),
            export_iterations: PBKDF2_ITERATIONS,
        })
    }

    /// Override the PBKDF2 iteration count used for exports.
    #[must_use]
    pub fn with_export_iterations(mut self, iterations: u32) -> Self {
        self.export_iterations = iterations.max(1);
        self
    }

    fn read_ring(&self) -> KeyResult<RwLockReadGuard<'_, KeyRing>> {
        self.ring
            .read()
            .map_err(|e| KeyError::Internal(format!("key ring lock poisoned: {e}")))
    }

    fn write_ring(&self) -> KeyResult<RwLockWriteGuard<'_, KeyRing>> {
        self.ring
            .write()
            .map_err(|e| KeyError::Internal(format!("key ring lock poisoned: {e}")))
    }

    // ---------------------------------------------------------------------
    // Policies
    // ---------------------------------------------------------------------

    /// All policies.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn policies(&self) -> KeyResult<PolicySet> {
        self.policies
            .read()
            .map(|p| p.clone())
            .map_err(|e| KeyError::Internal(format!("policy lock poisoned: {e}")))
    }

    /// The policy for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn policy(&self, purpose: KeyPurpose) -> KeyResult<RotationPolicy> {
        self.policies
            .read()
            .map(|p| p.get(purpose))
            .map_err(|e| KeyError::Internal(format!("policy lock poisoned: {e}")))
    }

    /// Replace and persist the policy for its purpose.
    ///
    /// The new interval governs when every key of the purpose is due,
    /// including the one already active. The stored policy outlives restarts
    /// and takes precedence over configuration.
    ///
    /// # Errors
    ///
    /// - [`KeyError::InvalidPolicy`] if the policy fails validation
    /// - [`KeyError::PersistenceFailure`]: the previous policy stays in force
    pub fn update_policy(&self, policy: RotationPolicy) -> KeyResult<()> {
        policy.validate()?;
        let purpose = policy.purpose;
        let mut policies = self
            .policies
            .write()
            .map_err(|e| KeyError::Internal(format!("policy lock poisoned: {e}")))?;
        self.store.save_policy(&policy)?;
        policies.set(policy)?;
        info!(%purpose, "Rotation policy updated");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------

    /// The active key for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::KeyNotFound`] if the purpose has no active key.
    pub fn get_active_key(&self, purpose: KeyPurpose) -> KeyResult<EncryptionKey> {
        self.read_ring()?
            .active_key(purpose)
            .cloned()
            .ok_or_else(|| KeyError::KeyNotFound(format!("no active {purpose} key")))
    }

    /// Any key by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::KeyNotFound`] if the key is unknown or purged.
    pub fn get_key(&self, id: KeyId) -> KeyResult<EncryptionKey> {
        match self.read_ring()?.keys.get(&id) {
            Some(key) if !key.is_purged() => Ok(key.clone()),
            _ => Err(KeyError::KeyNotFound(id.to_string())),
        }
    }

    /// Metadata of every key of `purpose`, newest version first.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn list_keys(&self, purpose: KeyPurpose) -> KeyResult<Vec<KeyStatus>> {
        let ring = self.read_ring()?;
        let mut keys: Vec<KeyStatus> = ring.keys_of(purpose).map(EncryptionKey::status).collect();
        keys.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(keys)
    }

    /// Check out the active key for one encryption.
    ///
    /// The usage counter is bumped under the same lock as the read, so a
    /// concurrent rotation cannot slip between them.
    pub(crate) fn checkout(&self, purpose: KeyPurpose) -> KeyResult<EncryptionKey> {
        let mut ring = self.write_ring()?;
        let id = *ring
            .active
            .get(&purpose)
            .ok_or_else(|| KeyError::KeyNotFound(format!("no active {purpose} key")))?;
        let key = ring
            .keys
            .get_mut(&id)
            .ok_or_else(|| KeyError::KeyNotFound(id.to_string()))?;
        key.record_use();
        let key = key.clone();
        ring.dirty.insert(id);
        Ok(key)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Generate a new inactive key for `purpose`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`] if the key cannot be stored.
    pub fn generate_key(&self, purpose: KeyPurpose) -> KeyResult<EncryptionKey> {
        let policy = self.policy(purpose)?;
        let mut ring = self.write_ring()?;
        let key = EncryptionKey::generate(
            purpose,
            ring.next_version(purpose),
            policy.rotation_interval_days,
        );
        commit(self.store.as_ref(), &self.kek, &mut ring, vec![key.clone()])?;
        info!(%purpose, key_id = %key.id, version = key.version, "Generated key");
        Ok(key)
    }

    /// Rotate the active key of `purpose`.
    ///
    /// Unless `force` is set, the rotation is refused while the active key is
    /// younger than the policy's rotation interval, or when the policy
    /// requires approval.
    ///
    /// # Errors
    ///
    /// - [`KeyError::RotationNotDue`] / [`KeyError::ApprovalRequired`]
    /// - [`KeyError::PersistenceFailure`]: the previous key stays active
    pub fn rotate_key(&self, purpose: KeyPurpose, force: bool) -> KeyResult<EncryptionKey> {
        let reason = if force { "forced rotation" } else { "rotation" };
        self.rotate(purpose, !force, !force, None, reason)
    }

    /// Rotate a purpose whose policy requires approval.
    ///
    /// The approval gate is satisfied by `approver`; the due check still applies.
    ///
    /// # Errors
    ///
    /// Same as [`rotate_key`](Self::rotate_key), minus `ApprovalRequired`.
    pub fn rotate_key_approved(
        &self,
        purpose: KeyPurpose,
        approver: &str,
    ) -> KeyResult<EncryptionKey> {
        self.rotate(purpose, true, false, Some(approver), "approved rotation")
    }

    fn rotate(
        &self,
        purpose: KeyPurpose,
        check_due: bool,
        check_approval: bool,
        actor: Option<&str>,
        reason: &str,
    ) -> KeyResult<EncryptionKey> {
        let policy = self.policy(purpose)?;
        let now = Timestamp::now();
        let mut ring = self.write_ring()?;

        let current = ring.active_key(purpose).cloned();
        if check_due
            && let Some(current) = &current
            && current.age_days(&now) < i64::from(policy.rotation_interval_days)
        {
            return Err(KeyError::RotationNotDue {
                purpose,
                due_at: policy.rotation_due_at(current.created_at),
            });
        }
        if check_approval && policy.requires_approval {
            return Err(KeyError::ApprovalRequired { purpose });
        }

        let mut new_key = EncryptionKey::generate(
            purpose,
            ring.next_version(purpose),
            policy.rotation_interval_days,
        );
        new_key.activate(actor);

        let mut changed = vec![new_key.clone()];
        let previous = current.map(|mut old| {
            old.deactivate(actor, reason);
            let id = old.id;
            changed.push(old);
            id
        });

        if let Err(e) = commit(self.store.as_ref(), &self.kek, &mut ring, changed) {
            warn!(%purpose, error = %e, "Key rotation failed; previous key remains active");
            return Err(e);
        }

        info!(
            %purpose,
            new_key_id = %new_key.id,
            version = new_key.version,
            previous_key_id = ?previous,
            reason,
            "Key rotated"
        );
        Ok(new_key)
    }

    /// Make an inactive key the active key of its purpose.
    ///
    /// # Errors
    ///
    /// - [`KeyError::KeyNotFound`] for an unknown ID
    /// - [`KeyError::KeyPurged`] if the material is gone
    /// - [`KeyError::PersistenceFailure`]
    pub fn activate_key(&self, id: KeyId, actor: Option<&str>) -> KeyResult<EncryptionKey> {
        let mut ring = self.write_ring()?;
        let target = ring
            .keys
            .get(&id)
            .cloned()
            .ok_or_else(|| KeyError::KeyNotFound(id.to_string()))?;
        if target.is_purged() {
            return Err(KeyError::KeyPurged(id.to_string()));
        }
        if target.is_active {
            return Ok(target);
        }

        let purpose = target.purpose;
        let mut target = target;
        target.activate(actor);
        let mut changed = vec![target.clone()];
        if let Some(current) = ring.active_key(purpose) {
            let mut current = current.clone();
            current.deactivate(actor, &format!("replaced by {id}"));
            changed.push(current);
        }

        commit(self.store.as_ref(), &self.kek, &mut ring, changed)?;
        info!(%purpose, key_id = %id, version = target.version, "Key activated");
        Ok(target)
    }

    /// Destroy the material of retired keys whose retention window has elapsed.
    ///
    /// Payloads sealed with a purged key can never be decrypted again.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`]; no key is purged then.
    pub fn cleanup_expired_keys(&self) -> KeyResult<usize> {
        let policies = self.policies()?;
        let now = Timestamp::now();
        let mut ring = self.write_ring()?;

        let changed: Vec<EncryptionKey> = ring
            .keys
            .values()
            .filter(|k| !k.is_active && !k.is_purged())
            .filter(|k| {
                k.retired_at.is_some_and(|retired| {
                    retired.plus_days(policies.get(k.purpose).retention_period_days) <= now
                })
            })
            .map(|k| {
                let mut k = k.clone();
                k.purge();
                k
            })
            .collect();

        let count = changed.len();
        if count == 0 {
            debug!("No keys past retention");
            return Ok(0);
        }
        for key in &changed {
            info!(purpose = %key.purpose, key_id = %key.id, version = key.version, "Purging key material");
        }
        commit(self.store.as_ref(), &self.kek, &mut ring, changed)?;
        Ok(count)
    }

    /// Export a key's material wrapped under `password`.
    ///
    /// # Errors
    ///
    /// - [`KeyError::WeakPassword`] for a password under 12 characters
    /// - [`KeyError::KeyNotFound`] / [`KeyError::KeyPurged`]
    pub fn export_key(&self, id: KeyId, password: &str, actor: Option<&str>) -> KeyResult<String> {
        check_password(password)?;
        let key = {
            let ring = self.read_ring()?;
            ring.keys
                .get(&id)
                .cloned()
                .ok_or_else(|| KeyError::KeyNotFound(id.to_string()))?
        };
        let material = key
            .material()
            .ok_or_else(|| KeyError::KeyPurged(id.to_string()))?;

        // Key derivation is slow; keep it outside the ring lock.
        let blob = KeyExport::create(&key, material, password, self.export_iterations)?.to_blob()?;

        let mut ring = self.write_ring()?;
        if let Some(current) = ring.keys.get(&id) {
            let mut current = current.clone();
            current.record(KeyEvent::now(KeyEventKind::Exported).by(actor));
            commit(self.store.as_ref(), &self.kek, &mut ring, vec![current])?;
        }
        info!(key_id = %id, purpose = %key.purpose, "Key exported");
        Ok(blob)
    }

    /// Import a key exported by [`export_key`](Self::export_key).
    ///
    /// The key arrives inactive, under the next free version of its purpose,
    /// and must be activated explicitly.
    ///
    /// # Errors
    ///
    /// - [`KeyError::WeakPassword`]
    /// - [`KeyError::InvalidExport`] for an unreadable blob
    /// - [`KeyError::AuthenticationFailed`] for a wrong password or tampered blob
    /// - [`KeyError::KeyAlreadyExists`] if the ID is already present
    pub fn import_key(
        &self,
        blob: &str,
        password: &str,
        actor: Option<&str>,
    ) -> KeyResult<EncryptionKey> {
        check_password(password)?;
        let export = KeyExport::from_blob(blob)?;
        if self.read_ring()?.keys.contains_key(&export.key_id) {
            return Err(KeyError::KeyAlreadyExists(export.key_id.to_string()));
        }
        let material = export.unwrap_material(password)?;

        let mut ring = self.write_ring()?;
        if ring.keys.contains_key(&export.key_id) {
            return Err(KeyError::KeyAlreadyExists(export.key_id.to_string()));
        }
        let mut key = EncryptionKey::imported(
            export.key_id,
            export.purpose,
            ring.next_version(export.purpose),
            export.created_at,
            export.expires_at,
            material,
        );
        key.record(
            KeyEvent::now(KeyEventKind::Imported)
                .by(actor)
                .detail(format!("exported as version {}", export.version)),
        );
        commit(self.store.as_ref(), &self.kek, &mut ring, vec![key.clone()])?;
        info!(key_id = %key.id, purpose = %key.purpose, version = key.version, "Key imported");
        Ok(key)
    }

    // ---------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------

    /// Statistics per purpose.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn metrics(&self) -> KeyResult<KeyMetrics> {
        let now = Timestamp::now();
        let policies = self.policies()?;
        let ring = self.read_ring()?;
        let purposes = KeyPurpose::ALL
            .into_iter()
            .map(|purpose| {
                let active = ring.active_key(purpose);
                PurposeMetrics {
                    purpose,
                    active_key_id: active.map(|k| k.id),
                    active_version: active.map(|k| k.version),
                    active_age_days: active.map(|k| k.age_days(&now)),
                    days_until_expiry: active.map(|k| {
                        policies
                            .get(purpose)
                            .rotation_due_at(k.created_at)
                            .0
                            .signed_duration_since(now.0)
                            .num_days()
                    }),
                    usage_count: active.map_or(0, |k| k.usage_count),
                    inactive_keys: ring
                        .keys_of(purpose)
                        .filter(|k| !k.is_active && !k.is_purged())
                        .count(),
                    purged_keys: ring.keys_of(purpose).filter(|k| k.is_purged()).count(),
                }
            })
            .collect();
        Ok(KeyMetrics {
            generated_at: now,
            purposes,
        })
    }

    /// Active keys matching `pred`, reported with their policy due time.
    fn active_matching<F>(&self, pred: F) -> KeyResult<Vec<KeyStatus>>
    where
        F: Fn(&EncryptionKey, &RotationPolicy) -> bool,
    {
        let policies = self.policies()?;
        let ring = self.read_ring()?;
        Ok(KeyPurpose::ALL
            .into_iter()
            .filter_map(|p| ring.active_key(p).map(|k| (k, policies.get(p))))
            .filter(|(k, policy)| pred(k, policy))
            .map(|(k, policy)| status_under(k, &policy))
            .collect())
    }

    /// Active keys at least as old as their policy's rotation interval.
    ///
    /// Agrees with the due check in [`rotate_key`](Self::rotate_key).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn due_for_rotation(&self, now: &Timestamp) -> KeyResult<Vec<KeyStatus>> {
        self.active_matching(|k, p| k.age_days(now) >= i64::from(p.rotation_interval_days))
    }

    /// Active keys not yet due but within their policy's notice window.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn expiring_within_notice(&self, now: &Timestamp) -> KeyResult<Vec<KeyStatus>> {
        self.active_matching(|k, p| {
            let due = p.rotation_due_at(k.created_at);
            k.age_days(now) < i64::from(p.rotation_interval_days)
                && due <= now.plus_days(p.notify_before_days)
        })
    }

    /// Active keys older than their policy's maximum age.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Internal`] on a poisoned lock.
    pub fn exceeding_max_age(&self, now: &Timestamp) -> KeyResult<Vec<KeyStatus>> {
        self.active_matching(|k, p| k.created_at.plus_days(p.max_key_age_days) <= *now)
    }

    // ---------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------

    /// Persist unsaved usage counters. Returns how many keys were written.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PersistenceFailure`]; counters stay pending then.
    pub fn flush(&self) -> KeyResult<usize> {
        let mut ring = self.write_ring()?;
        let count = ring.dirty.len();
        if count > 0 {
            commit(self.store.as_ref(), &self.kek, &mut ring, Vec::new())?;
            debug!(count, "Flushed key usage counters");
        }
        self.store.flush()?;
        Ok(count)
    }

    /// Flush and release the manager.
    ///
    /// # Errors
    ///
    /// Same as [`flush`](Self::flush).
    pub fn close(&self) -> KeyResult<()> {
        self.flush().map(|_| ())
    }
}
