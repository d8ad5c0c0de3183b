//! Automerge-backed replica engine.

use automerge::sync::{self, SyncDoc};
use automerge::transaction::Transactable;
use automerge::{
    ActorId, Automerge, AutomergeError, ChangeHash, ReadDoc, ScalarValue, Value, ROOT,
};
use std::collections::BTreeMap;

use crate::error::{ReplicaError, Result};
use crate::replica::{FieldValue, Mutation, Replica};

/// A replica holding one Automerge document.
#[derive(Debug)]
pub struct AutomergeReplica {
    doc: Automerge,
}

impl AutomergeReplica {
    pub fn from_doc(doc: Automerge) -> Self {
        Self { doc }
    }

    pub fn doc(&self) -> &Automerge {
        &self.doc
    }

    pub fn into_doc(self) -> Automerge {
        self.doc
    }

    /// Hex rendering of this replica's actor id.
    pub fn actor(&self) -> String {
        self.doc.get_actor().to_hex_string()
    }

    /// Use a caller-chosen actor id for subsequent local changes.
    pub fn set_actor(&mut self, actor: &[u8]) {
        self.doc.set_actor(ActorId::from(actor));
    }

    /// Number of changes in the document history.
    pub fn change_count(&self) -> usize {
        self.doc.get_changes(&[]).len()
    }
}

impl Default for AutomergeReplica {
    fn default() -> Self {
        Self::empty()
    }
}

impl Replica for AutomergeReplica {
    type SyncState = sync::State;

    fn empty() -> Self {
        Self::from_doc(Automerge::new())
    }

    fn load(bytes: &[u8]) -> Result<Self> {
        Automerge::load(bytes)
            .map(Self::from_doc)
            .map_err(|e| ReplicaError::InvalidFormat(e.to_string()))
    }

    fn save(&self) -> Vec<u8> {
        self.doc.save()
    }

    fn heads(&self) -> Vec<String> {
        let mut heads: Vec<String> = self.doc.get_heads().iter().map(ToString::to_string).collect();
        heads.sort();
        heads
    }

    fn fork(&self) -> Self {
        Self::from_doc(self.doc.fork())
    }

    fn fork_at(&self, heads: &[String]) -> Result<Self> {
        let hashes = heads
            .iter()
            .map(|h| parse_change_hash(h))
            .collect::<Result<Vec<_>>>()?;
        self.doc
            .fork_at(&hashes)
            .map(Self::from_doc)
            .map_err(|e| ReplicaError::InvalidFormat(e.to_string()))
    }

    fn apply(&mut self, mutation: &Mutation) -> Result<()> {
        self.doc
            .transact::<_, _, AutomergeError>(|tx| {
                match mutation {
                    Mutation::Put { key, value } => {
                        tx.put(ROOT, key.as_str(), value.as_str())?;
                    }
                    Mutation::SetCounter { key, value } => {
                        tx.put(ROOT, key.as_str(), ScalarValue::counter(*value))?;
                    }
                    Mutation::Increment { key, by } => {
                        let is_counter = matches!(
                            tx.get(ROOT, key.as_str())?,
                            Some((Value::Scalar(s), _)) if matches!(*s, ScalarValue::Counter(_))
                        );
                        if is_counter {
                            tx.increment(ROOT, key.as_str(), *by)?;
                        } else {
                            tx.put(ROOT, key.as_str(), ScalarValue::counter(*by))?;
                        }
                    }
                }
                Ok(())
            })
            .map(|_| ())
            .map_err(|failure| ReplicaError::Mutation(failure.error.to_string()))
    }

    fn values(&self) -> Result<BTreeMap<String, FieldValue>> {
        let mut out = BTreeMap::new();
        for key in self.doc.keys(ROOT) {
            let value = self
                .doc
                .get(ROOT, key.as_str())
                .map_err(|e| ReplicaError::InvalidFormat(e.to_string()))?;
            if let Some((value, _)) = value {
                out.insert(key, field_value(&value));
            }
        }
        Ok(out)
    }

    fn new_sync_state(&self) -> sync::State {
        sync::State::new()
    }

    fn load_sync_state(&self, bytes: &[u8]) -> Result<sync::State> {
        sync::State::decode(bytes).map_err(|e| ReplicaError::InvalidCookie(e.to_string()))
    }

    fn save_sync_state(&self, state: &sync::State) -> Vec<u8> {
        state.encode()
    }

    fn generate_message(&self, state: &mut sync::State) -> Option<Vec<u8>> {
        self.doc
            .generate_sync_message(state)
            .map(sync::Message::encode)
    }

    fn receive_message(&mut self, state: &mut sync::State, message: &[u8]) -> Result<()> {
        let message = sync::Message::decode(message)
            .map_err(|e| ReplicaError::InvalidMessage(e.to_string()))?;
        self.doc
            .receive_sync_message(state, message)
            .map_err(|e| ReplicaError::InvalidMessage(e.to_string()))
    }
}

fn parse_change_hash(text: &str) -> Result<ChangeHash> {
    let bytes = hex::decode(text)
        .map_err(|_| ReplicaError::InvalidFormat(format!("invalid change hash: {text}")))?;
    ChangeHash::try_from(bytes.as_slice())
        .map_err(|_| ReplicaError::InvalidFormat(format!("invalid change hash: {text}")))
}

fn field_value(value: &Value<'_>) -> FieldValue {
    match value {
        Value::Object(obj) => FieldValue::Other(format!("{obj:?}")),
        Value::Scalar(s) => match &**s {
            ScalarValue::Counter(_) => FieldValue::Counter(s.to_i64().unwrap_or_default()),
            ScalarValue::Int(n) => FieldValue::Int(*n),
            ScalarValue::Uint(n) => FieldValue::Int(i64::try_from(*n).unwrap_or(i64::MAX)),
            ScalarValue::Str(text) => FieldValue::Text(text.to_string()),
            ScalarValue::Boolean(b) => FieldValue::Bool(*b),
            other => FieldValue::Other(format!("{other:?}")),
        },
    }
}
