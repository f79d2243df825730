//! Policy state machine: classify a store snapshot and stage the operation
//! batches for Enable / Disable / NotConfigure transitions.
//!
//! Staging does no I/O; only `commit` touches the store, and it hands the
//! whole batch to the collaborator's atomic `apply`. Classification follows a
//! fixed decision order: sentinel match first, then the all-absent check,
//! then list evidence, and Suspect for everything else.

use crate::catalog::model::{Policy, PolicyClass, PolicyState};
use crate::element::{DefaultValue, ElementValue, StoreRecord};
use crate::error::{EntityKind, PolicyError, Result, StoreError};
use crate::store::{PolicySnapshot, PolicyStore, StoreOp};
use std::collections::BTreeMap;
use tracing::debug;

/// Explicit per-element token input for an Enable transition, keyed by
/// element id.
pub type ElementInput = BTreeMap<String, Vec<String>>;

pub struct StateMachine<'a> {
    policy: &'a Policy,
}

impl<'a> StateMachine<'a> {
    pub fn new(policy: &'a Policy) -> Self {
        Self { policy }
    }

    /// Read every key this policy can touch from one scope's store.
    pub fn snapshot<S: PolicyStore + ?Sized>(
        &self,
        store: &S,
    ) -> std::result::Result<PolicySnapshot, StoreError> {
        PolicySnapshot::collect(store, self.policy.touched_keys())
    }

    /// Classify one scope's snapshot.
    pub fn class_state(&self, snap: &PolicySnapshot) -> PolicyState {
        let p = self.policy;

        // Sentinel values are unambiguous and take precedence.
        if let Some(value_name) = &p.value_name {
            if let Some(stored) = snap.value(&p.key, value_name) {
                let matches_enabled = p.effective_enabled_value().as_ref() == Some(stored);
                let matches_disabled = p.effective_disabled_value().as_ref() == Some(stored);
                return match (matches_enabled, matches_disabled) {
                    (true, false) => PolicyState::Enabled,
                    (false, true) => PolicyState::Disabled,
                    _ => PolicyState::Suspect,
                };
            }
        }

        let enabled_named = named_present(&p.enabled_list, snap);
        let disabled_named = named_present(&p.disabled_list, snap);
        if enabled_named == 0 && disabled_named == 0 {
            return PolicyState::NotConfigured;
        }

        // List evidence: an entry counts only with its declared value, so a
        // shared value name written with the opposite constant cannot count
        // for both sides.
        let enabled_all = all_match(&p.enabled_list, snap);
        let disabled_all = all_match(&p.disabled_list, snap);
        let enabled_any = any_match(&p.enabled_list, snap);
        let disabled_any = any_match(&p.disabled_list, snap);
        if enabled_all && !disabled_any {
            return PolicyState::Enabled;
        }
        if disabled_all && !enabled_any {
            return PolicyState::Disabled;
        }
        PolicyState::Suspect
    }

    /// State of a single-scope policy, or of one scope of a Both policy.
    /// A failed snapshot read is `Unknown`, never an error.
    pub fn scope_state<S: PolicyStore + ?Sized>(&self, store: &S) -> PolicyState {
        match self.snapshot(store) {
            Ok(snap) => self.class_state(&snap),
            Err(err) => {
                debug!(policy = %self.policy.prefixed_name, %err, "snapshot read failed");
                PolicyState::Unknown
            }
        }
    }

    /// Overall state across both scopes, honoring the policy's class.
    pub fn state<S: PolicyStore + ?Sized>(&self, machine: &S, user: &S) -> PolicyState {
        match self.policy.class {
            PolicyClass::Machine => self.scope_state(machine),
            PolicyClass::User => self.scope_state(user),
            PolicyClass::Both => {
                combine_states(self.scope_state(machine), self.scope_state(user))
            }
        }
    }

    /// Stage the Enable batch. Every element resolves (explicit input, else
    /// default) before any operation is staged; the first unresolvable
    /// element fails the whole transition with nothing staged.
    pub fn enable(&self, input: &ElementInput) -> Result<Vec<StoreOp>> {
        let p = self.policy;
        for id in input.keys() {
            if p.element(id).is_none() {
                return Err(PolicyError::not_found(
                    EntityKind::Element,
                    format!("{}/{id}", p.prefixed_name),
                ));
            }
        }

        let mut resolved = Vec::new();
        for element in &p.elements {
            match input.get(element.id()) {
                Some(tokens) => resolved.push((element, element.parse_tokens(tokens)?)),
                None => match element.default_value() {
                    DefaultValue::Value(value) => resolved.push((element, value)),
                    DefaultValue::Skip => {}
                    DefaultValue::Missing => {
                        return Err(PolicyError::missing_value(
                            &p.prefixed_name,
                            element.id(),
                        ));
                    }
                },
            }
        }

        let mut ops = Vec::new();
        if let (Some(value_name), Some(value)) = (&p.value_name, p.effective_enabled_value()) {
            ops.push(StoreOp::write(&p.key, value_name, value));
        }
        ops.extend(record_writes(&p.enabled_list));
        for (element, value) in resolved {
            ops.extend(element.write_ops(&value)?);
        }
        // Leftover disabled evidence from an earlier Disable would make the
        // next GetState ambiguous; clear whatever this batch does not rewrite.
        let cleanup: Vec<StoreOp> = p
            .disabled_list
            .iter()
            .map(|r| StoreOp::delete(&r.key, &r.value_name))
            .collect();
        append_unshadowed(&mut ops, cleanup);
        Ok(ops)
    }

    /// Stage the Disable batch: sentinel, DisabledList, then deletes for
    /// every entry any element could own plus stale EnabledList evidence. A
    /// delete never targets an entry this same batch writes, so a Boolean's
    /// implied false-delete is not re-introduced against the sentinel.
    pub fn disable(&self) -> Vec<StoreOp> {
        let p = self.policy;
        let mut ops = Vec::new();
        if let (Some(value_name), Some(value)) = (&p.value_name, p.effective_disabled_value()) {
            ops.push(StoreOp::write(&p.key, value_name, value));
        }
        ops.extend(record_writes(&p.disabled_list));

        let mut cleanup = Vec::new();
        for element in &p.elements {
            cleanup.extend(element.delete_ops());
        }
        cleanup.extend(
            p.enabled_list
                .iter()
                .map(|r| StoreOp::delete(&r.key, &r.value_name)),
        );
        append_unshadowed(&mut ops, cleanup);
        ops
    }

    /// Stage deletes for every entry the policy could ever own. Idempotent
    /// from any starting state.
    pub fn not_configure(&self) -> Vec<StoreOp> {
        let p = self.policy;
        let mut ops = Vec::new();
        if let Some(value_name) = &p.value_name {
            ops.push(StoreOp::delete(&p.key, value_name));
        }
        for record in p.enabled_list.iter().chain(&p.disabled_list) {
            let op = StoreOp::delete(&record.key, &record.value_name);
            if !ops.contains(&op) {
                ops.push(op);
            }
        }
        for element in &p.elements {
            for op in element.delete_ops() {
                if !ops.contains(&op) {
                    ops.push(op);
                }
            }
        }
        ops
    }

    /// Decode the current element values. Valid only while Enabled.
    pub fn get_values(&self, snap: &PolicySnapshot) -> Result<BTreeMap<String, ElementValue>> {
        let state = self.class_state(snap);
        if state != PolicyState::Enabled {
            return Err(PolicyError::invalid_state(
                &self.policy.prefixed_name,
                "read values",
                state,
            ));
        }
        let mut values = BTreeMap::new();
        for element in &self.policy.elements {
            if !element.required() && !element.is_present(snap) {
                continue;
            }
            values.insert(element.id().to_string(), element.read_value(snap)?);
        }
        Ok(values)
    }
}

/// Commit a staged batch through the collaborator; a rejected batch is a
/// `Transaction` error with no partial effect.
pub fn commit<S: PolicyStore + ?Sized>(store: &mut S, ops: &[StoreOp]) -> Result<()> {
    store
        .apply(ops)
        .map_err(|err| PolicyError::Transaction(err.to_string()))
}

/// Append `deletes`, skipping any that target an entry an earlier op in the
/// batch writes, and any duplicates.
fn append_unshadowed(ops: &mut Vec<StoreOp>, deletes: Vec<StoreOp>) {
    let written: Vec<(String, String)> = ops
        .iter()
        .filter_map(|op| match op {
            StoreOp::Write {
                key, value_name, ..
            } => Some((key.to_ascii_lowercase(), value_name.to_ascii_lowercase())),
            StoreOp::Delete { .. } => None,
        })
        .collect();
    for op in deletes {
        let shadowed = match &op {
            StoreOp::Delete {
                key,
                value_name: Some(name),
            } => written.contains(&(key.to_ascii_lowercase(), name.to_ascii_lowercase())),
            // A purge drops the whole key; writes under it from this same
            // batch would be lost.
            StoreOp::Delete {
                key,
                value_name: None,
            } => written.iter().any(|(k, _)| k == &key.to_ascii_lowercase()),
            StoreOp::Write { .. } => false,
        };
        if !shadowed && !ops.contains(&op) {
            ops.push(op);
        }
    }
}

fn combine_states(machine: PolicyState, user: PolicyState) -> PolicyState {
    if machine == user {
        return machine;
    }
    // A failed read on either side makes the combined answer unknowable.
    if machine == PolicyState::Unknown || user == PolicyState::Unknown {
        return PolicyState::Unknown;
    }
    if machine == PolicyState::NotConfigured {
        return user;
    }
    if user == PolicyState::NotConfigured {
        return machine;
    }
    PolicyState::Suspect
}

fn named_present(records: &[StoreRecord], snap: &PolicySnapshot) -> usize {
    records
        .iter()
        .filter(|r| snap.contains(&r.key, &r.value_name))
        .count()
}

fn all_match(records: &[StoreRecord], snap: &PolicySnapshot) -> bool {
    !records.is_empty()
        && records
            .iter()
            .all(|r| snap.value(&r.key, &r.value_name) == Some(&r.value))
}

fn any_match(records: &[StoreRecord], snap: &PolicySnapshot) -> bool {
    records
        .iter()
        .any(|r| snap.value(&r.key, &r.value_name) == Some(&r.value))
}

fn record_writes(records: &[StoreRecord]) -> Vec<StoreOp> {
    records
        .iter()
        .map(|r| StoreOp::write(&r.key, &r.value_name, r.value.clone()))
        .collect()
}
