use crate::error::PaxosResult;
use crate::types::{Message, NodeId};
use std::path::Path;

const KEY_LAST_PROMISED: &str = "last_promised";
const KEY_LAST_ACCEPTED: &str = "last_accepted";
const KEY_NODE_ID: &[u8] = b"node_id";

/// Durable home of an acceptor's promise and accepted records.
pub trait AcceptorStorage: Send + Sync {
    fn load_promised(&self, node_id: &str) -> PaxosResult<Option<Message>>;
    fn load_accepted(&self, node_id: &str) -> PaxosResult<Option<Message>>;
    fn save_promised(&self, node_id: &str, msg: &Message) -> PaxosResult<()>;
    fn save_accepted(&self, node_id: &str, msg: &Message) -> PaxosResult<()>;
}

/// Durable acceptor records, keyed by the node's stable identity rather than
/// its network address.
#[derive(Clone)]
pub struct AcceptorStore {
    db: sled::Db,
    acceptor_tree: sled::Tree,
    meta_tree: sled::Tree,
}

impl AcceptorStore {
    pub fn open<P: AsRef<Path>>(path: P) -> PaxosResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn temporary() -> PaxosResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> PaxosResult<Self> {
        let acceptor_tree = db.open_tree("acceptor")?;
        let meta_tree = db.open_tree("meta")?;
        Ok(Self {
            db,
            acceptor_tree,
            meta_tree,
        })
    }

    fn record_key(node_id: &str, record: &str) -> Vec<u8> {
        format!("{}/{}", node_id, record).into_bytes()
    }

    fn load(&self, node_id: &str, record: &str) -> PaxosResult<Option<Message>> {
        match self.acceptor_tree.get(Self::record_key(node_id, record))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, node_id: &str, record: &str, msg: &Message) -> PaxosResult<()> {
        let data = bincode::serialize(msg)?;
        self.acceptor_tree
            .insert(Self::record_key(node_id, record), data)?;
        self.acceptor_tree.flush()?;
        Ok(())
    }

    /// Returns the stored identity, generating and persisting one on first use.
    pub fn node_identity(&self) -> PaxosResult<NodeId> {
        if let Some(bytes) = self.meta_tree.get(KEY_NODE_ID)? {
            return Ok(String::from_utf8_lossy(&bytes).to_string());
        }
        let node_id = uuid::Uuid::new_v4().to_string();
        self.meta_tree.insert(KEY_NODE_ID, node_id.as_bytes())?;
        self.db.flush()?;
        tracing::info!(node_id = %node_id, "generated node identity");
        Ok(node_id)
    }
}

impl AcceptorStorage for AcceptorStore {
    fn load_promised(&self, node_id: &str) -> PaxosResult<Option<Message>> {
        self.load(node_id, KEY_LAST_PROMISED)
    }

    fn load_accepted(&self, node_id: &str) -> PaxosResult<Option<Message>> {
        self.load(node_id, KEY_LAST_ACCEPTED)
    }

    fn save_promised(&self, node_id: &str, msg: &Message) -> PaxosResult<()> {
        self.save(node_id, KEY_LAST_PROMISED, msg)
    }

    fn save_accepted(&self, node_id: &str, msg: &Message) -> PaxosResult<()> {
        self.save(node_id, KEY_LAST_ACCEPTED, msg)
    }
}
