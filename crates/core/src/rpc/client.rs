/// Session with the directory daemon
///
/// The daemon is the blockchain-backed authority for the master node list,
/// the current block height, LNS records and this node's own identity key.
/// All async operations return immediately and finish on runtime tasks.
/// A dropped session is re-established in the background with backoff for
/// as long as the router is alive.

use super::{ConnectionId, DirectoryError, MessageTransport, Router};
use crate::dht::DhtKey;
use crate::identity::{KeyPair, PublicKey, RouterId};
use crate::service::{name_hash, EncryptedName, ServiceAddress};
use arc_swap::{ArcSwap, ArcSwapOption};
use bdxnet_common::rpc::{
    GET_HEIGHT, GET_MASTER_NODES, GET_MASTER_PRIVKEYS, GET_PEER_STATS, LNS_RESOLVE,
    LNS_TYPE_BDXNET, MAX_RECONNECT_DELAY_MS, NOTIFY_BLOCK, REPORT_PEER_STATUS, STATUS_OK,
    SUBSCRIBE_BLOCKS,
};
use bdxnet_common::{ClientConfig, PeerStats};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

#[derive(Deserialize)]
struct MasterNodeList {
    master_node_states: Vec<serde_json::Value>,
    #[serde(default)]
    height: Option<u64>,
}

#[derive(Deserialize)]
struct MasterNodeState {
    pubkey_ed25519: String,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct HeightReply {
    height: u64,
}

#[derive(Deserialize)]
struct LnsReply {
    encrypted_value: String,
    nonce: String,
}

#[derive(Deserialize)]
struct PrivkeysReply {
    master_node_ed25519_privkey: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerStatsRequest {
    router_ids: Vec<String>,
}

/// Directory daemon client
pub struct DirectoryClient {
    transport: Arc<dyn MessageTransport>,
    router: Weak<dyn Router>,
    runtime: Handle,
    config: ClientConfig,

    connection: ArcSwapOption<ConnectionId>,

    /// Address of the last connect, reused when reconnecting
    address: ArcSwapOption<String>,

    handlers_registered: AtomicBool,

    /// Set while a reconnect loop is running
    reconnecting: AtomicBool,

    /// Master node list, replaced wholesale on each refresh
    key_map: ArcSwap<HashMap<RouterId, PublicKey>>,

    block_height: AtomicU64,

    /// Set while a master node list refresh is in flight
    updating_list: AtomicBool,
}

impl DirectoryClient {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        router: Weak<dyn Router>,
        runtime: Handle,
        config: ClientConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            router,
            runtime,
            config,
            connection: ArcSwapOption::empty(),
            address: ArcSwapOption::empty(),
            handlers_registered: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            key_map: ArcSwap::from_pointee(HashMap::new()),
            block_height: AtomicU64::new(0),
            updating_list: AtomicBool::new(false),
        })
    }

    /// Start connecting in the background, retrying with backoff on failure
    pub fn connect_async(self: &Arc<Self>, address: impl Into<String>) {
        let client = Arc::clone(self);
        let address = address.into();
        self.runtime.spawn(async move {
            if let Err(e) = client.connect(&address).await {
                warn!("Failed to connect to directory daemon at {}: {}", address, e);
                client.spawn_reconnect();
            }
        });
    }

    /// Connect, subscribe to new blocks and fetch the initial state
    pub async fn connect(self: &Arc<Self>, address: &str) -> Result<(), DirectoryError> {
        self.address.store(Some(Arc::new(address.to_string())));
        let conn = self.transport.connect(address).await?;
        self.connection.store(Some(Arc::new(conn)));
        info!("Connected to directory daemon at {} ({})", address, conn);

        if !self.handlers_registered.swap(true, Ordering::AcqRel) {
            self.register_handlers();
        }

        if let Err(e) = self.transport.command(conn, SUBSCRIBE_BLOCKS, Vec::new()).await {
            warn!("Failed to subscribe to new blocks: {}", e);
        }

        self.update_master_node_list();

        if let Err(e) = self.sync_block_height().await {
            warn!("Failed to fetch block height: {}", e);
        }

        Ok(())
    }

    fn register_handlers(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.transport.register_handler(
            GET_PEER_STATS,
            Arc::new(move |data| {
                let client = weak.upgrade()?;
                Some(client.handle_get_peer_stats(&data))
            }),
        );

        let weak = Arc::downgrade(self);
        self.transport.register_handler(
            NOTIFY_BLOCK,
            Arc::new(move |data| {
                if let Some(client) = weak.upgrade() {
                    client.handle_new_block(&data);
                }
                None
            }),
        );

        let weak = Arc::downgrade(self);
        self.transport.register_disconnect(Arc::new(move |conn| {
            if let Some(client) = weak.upgrade() {
                client.handle_disconnect(conn);
            }
        }));
    }

    /// Forget a closed session and start reconnecting
    ///
    /// Closures of connections other than the current one are ignored.
    pub fn handle_disconnect(self: &Arc<Self>, conn: ConnectionId) {
        let previous = self.connection.rcu(|current| match current {
            Some(current) if **current == conn => None,
            other => other.clone(),
        });
        if previous.as_deref() != Some(&conn) {
            return;
        }

        warn!("Lost directory daemon session {}", conn);
        if self.router.upgrade().is_none() {
            debug!("Router gone, not reconnecting");
            return;
        }
        self.spawn_reconnect();
    }

    /// Reconnect to the last address until it works, the router goes away
    /// or the client is dropped. At most one loop runs at a time.
    fn spawn_reconnect(self: &Arc<Self>) {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let weak = Arc::downgrade(self);
        let mut delay = self.config.reconnect_delay().max(Duration::from_millis(1));
        let max_delay = Duration::from_millis(MAX_RECONNECT_DELAY_MS).max(delay);
        self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(delay).await;

                let client = match weak.upgrade() {
                    Some(client) => client,
                    None => return,
                };
                let address = match client.address.load_full() {
                    Some(address) if client.router.upgrade().is_some() => address,
                    _ => {
                        client.reconnecting.store(false, Ordering::Release);
                        return;
                    }
                };

                match client.connect(&address).await {
                    Ok(()) => {
                        client.reconnecting.store(false, Ordering::Release);
                        // The new session may already have closed again
                        if !client.is_connected() {
                            client.spawn_reconnect();
                        }
                        return;
                    }
                    Err(e) => {
                        delay = (delay * 2).min(max_delay);
                        warn!("Reconnect to {} failed, retrying in {:?}: {}", address, delay, e);
                    }
                }
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    fn connection(&self) -> Option<ConnectionId> {
        self.connection.load_full().map(|conn| *conn)
    }

    /// Fetch this node's identity key, blocking the calling thread
    ///
    /// Must not be called from a runtime worker thread. Each attempt waits
    /// up to the identity timeout; the last error is returned once all
    /// attempts fail.
    pub fn obtain_identity_key(&self) -> Result<KeyPair, DirectoryError> {
        let attempts = self.config.identity_attempts.max(1);
        let mut last_error = DirectoryError::NotConnected;

        for attempt in 1..=attempts {
            match self.fetch_identity_key() {
                Ok(keypair) => {
                    info!("Obtained identity key {}", keypair.public_key());
                    return Ok(keypair);
                }
                Err(e) => {
                    warn!(
                        "Identity key request failed (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                    last_error = e;
                }
            }

            if attempt < attempts {
                std::thread::sleep(self.config.identity_retry_delay());
            }
        }

        error!("Could not obtain identity key: {}", last_error);
        Err(last_error)
    }

    fn fetch_identity_key(&self) -> Result<KeyPair, DirectoryError> {
        let conn = self.connection().ok_or(DirectoryError::NotConnected)?;

        let (tx, rx) = mpsc::channel();
        let transport = Arc::clone(&self.transport);
        self.runtime.spawn(async move {
            let _ = tx.send(transport.request(conn, GET_MASTER_PRIVKEYS, Vec::new()).await);
        });

        let data = match rx.recv_timeout(self.config.identity_timeout()) {
            Ok(result) => result?,
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(DirectoryError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => return Err(DirectoryError::RuntimeGone),
        };

        let reply: PrivkeysReply = parse_body(&reply_body(data)?)?;
        KeyPair::from_hex(&reply.master_node_ed25519_privkey)
            .map_err(|e| DirectoryError::InvalidKey(e.to_string()))
    }

    /// Last synced block height
    pub fn block_height(&self) -> u64 {
        self.block_height.load(Ordering::Acquire)
    }

    fn advance_height(&self, height: u64) -> bool {
        self.block_height.fetch_max(height, Ordering::AcqRel) < height
    }

    /// Ask the daemon for its current height
    pub async fn sync_block_height(&self) -> Result<u64, DirectoryError> {
        let reply: HeightReply = parse_body(&self.request(GET_HEIGHT, Vec::new()).await?)?;
        self.advance_height(reply.height);
        debug!("Directory daemon at height {}", reply.height);
        Ok(self.block_height())
    }

    async fn request(&self, command: &str, args: Vec<String>) -> Result<String, DirectoryError> {
        let conn = self.connection().ok_or(DirectoryError::NotConnected)?;
        let data = tokio::time::timeout(
            self.config.request_timeout(),
            self.transport.request(conn, command, args),
        )
        .await
        .map_err(|_| DirectoryError::Timeout)??;
        reply_body(data)
    }

    /// Look up the LNS record stored under `name_hash`
    ///
    /// `handler` runs once on a runtime task with the record, or `None` when
    /// there is none or the request failed. If the router has shut down by
    /// then, `handler` is dropped without being called.
    pub fn lookup_lns_name_hash<F>(self: &Arc<Self>, name_hash: DhtKey, handler: F)
    where
        F: FnOnce(Option<EncryptedName>) + Send + 'static,
    {
        let client = Arc::clone(self);
        self.runtime.spawn(async move {
            let record = client.fetch_lns_record(&name_hash).await;
            if client.router.upgrade().is_none() {
                debug!("Router gone, dropping LNS result for {}", name_hash.to_hex());
                return;
            }
            handler(record);
        });
    }

    async fn fetch_lns_record(&self, name_hash: &DhtKey) -> Option<EncryptedName> {
        let args = vec![json!({
            "type": LNS_TYPE_BDXNET,
            "name_hash": name_hash.to_hex(),
        })
        .to_string()];

        let body = match self.request(LNS_RESOLVE, args).await {
            Ok(body) => body,
            Err(e) => {
                debug!("LNS lookup for {} failed: {}", name_hash.to_hex(), e);
                return None;
            }
        };

        let reply: LnsReply = match parse_body(&body) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Bad LNS reply: {}", e);
                return None;
            }
        };

        EncryptedName::from_hex(&reply.encrypted_value, &reply.nonce)
            .map_err(|e| warn!("Bad LNS record: {}", e))
            .ok()
    }

    /// Resolve a plain `.bdx` name to the service address it is registered to
    pub async fn resolve_lns_name(&self, name: &str) -> Option<ServiceAddress> {
        let record = self.fetch_lns_record(&name_hash(name)).await?;
        record.decrypt(name)
    }

    /// Report the outcome of a connection attempt to a relay
    pub fn inform_connection(&self, router_id: &RouterId, success: bool) {
        let conn = match self.connection() {
            Some(conn) => conn,
            None => {
                debug!("Not connected, not reporting status of {}", router_id);
                return;
            }
        };

        let args = vec![json!({
            "type": "bdxnet",
            "pubkey": router_id.to_hex(),
            "passed": success,
        })
        .to_string()];

        let transport = Arc::clone(&self.transport);
        self.runtime.spawn(async move {
            if let Err(e) = transport.command(conn, REPORT_PEER_STATUS, args).await {
                warn!("Failed to report peer status: {}", e);
            }
        });
    }

    /// Refresh the master node list in the background
    ///
    /// Returns `false` when not connected or when a refresh is already in
    /// flight; the call is dropped, not queued.
    pub fn update_master_node_list(self: &Arc<Self>) -> bool {
        if !self.is_connected() {
            debug!("Not connected, skipping master node list refresh");
            return false;
        }

        if self
            .updating_list
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Master node list refresh already in flight");
            return false;
        }

        let client = Arc::clone(self);
        self.runtime.spawn(async move {
            let args = vec![json!({
                "fields": { "pubkey_ed25519": true, "active": true },
            })
            .to_string()];

            match client.request(GET_MASTER_NODES, args).await {
                Ok(body) => {
                    if let Err(e) = client.handle_got_master_node_list(&body) {
                        warn!("Discarding master node list: {}", e);
                    }
                }
                Err(e) => warn!("Master node list request failed: {}", e),
            }

            client.updating_list.store(false, Ordering::Release);
        });

        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.updating_list.load(Ordering::Acquire)
    }

    /// Replace the master node list with the one in `payload`
    ///
    /// Malformed and inactive entries are skipped. Returns the number of
    /// relays in the new list.
    pub fn handle_got_master_node_list(&self, payload: &str) -> Result<usize, DirectoryError> {
        let list: MasterNodeList = parse_body(payload)?;

        let mut keys = HashMap::with_capacity(list.master_node_states.len());
        for entry in list.master_node_states {
            let state: MasterNodeState = match serde_json::from_value(entry) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Skipping malformed master node entry: {}", e);
                    continue;
                }
            };

            if !state.active {
                continue;
            }

            let router_id = match RouterId::from_hex(&state.pubkey_ed25519) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping master node {:?}: {}", state.pubkey_ed25519, e);
                    continue;
                }
            };

            match PublicKey::from_bytes(router_id.as_bytes()) {
                Ok(key) => {
                    keys.insert(router_id, key);
                }
                Err(e) => warn!("Skipping master node {}: {}", router_id, e),
            }
        }

        if let Some(height) = list.height {
            self.advance_height(height);
        }

        let count = keys.len();
        let routers: Vec<RouterId> = keys.keys().copied().collect();
        self.key_map.store(Arc::new(keys));
        info!("Master node list updated: {} relays", count);

        if self.config.whitelist_routers {
            if let Some(router) = self.router.upgrade() {
                router.set_router_whitelist(routers);
            }
        }

        Ok(count)
    }

    /// Answer the daemon's request for connection statistics
    pub fn handle_get_peer_stats(&self, data: &[String]) -> Vec<String> {
        let router = match self.router.upgrade() {
            Some(router) => router,
            None => return error_reply("router is shutting down"),
        };

        if data.len() != 1 {
            warn!("Peer stats request with {} parts, expected 1", data.len());
            return error_reply("expected a single JSON argument");
        }

        let request: PeerStatsRequest = match serde_json::from_str(&data[0]) {
            Ok(request) => request,
            Err(e) => {
                warn!("Bad peer stats request: {}", e);
                return error_reply("expected {\"routerIds\": [...]}");
            }
        };

        let stats: Vec<PeerStats> = request
            .router_ids
            .iter()
            .filter_map(|hex| match RouterId::from_hex(hex) {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!("Ignoring router id {:?} in peer stats request: {}", hex, e);
                    None
                }
            })
            .filter_map(|id| router.peer_stats(&id))
            .collect();

        match serde_json::to_string(&stats) {
            Ok(json) => vec![json],
            Err(e) => error_reply(&e.to_string()),
        }
    }

    /// Handle a `[height, hash]` new block notification
    pub fn handle_new_block(self: &Arc<Self>, data: &[String]) {
        if data.len() != 2 {
            warn!("New block notification with {} parts, expected 2", data.len());
            return;
        }

        let height: u64 = match data[0].parse() {
            Ok(height) => height,
            Err(_) => {
                warn!("New block notification with bad height {:?}", data[0]);
                return;
            }
        };

        if !matches!(hex::decode(&data[1]), Ok(hash) if hash.len() == 32) {
            warn!("New block notification with bad hash {:?}", data[1]);
            return;
        }

        if self.router.upgrade().is_none() {
            return;
        }

        if self.advance_height(height) {
            debug!("New block {} at height {}", data[1], height);
            self.update_master_node_list();
        }
    }

    /// Identity key of a master node, if it is in the current list
    pub fn master_node_key(&self, router_id: &RouterId) -> Option<PublicKey> {
        self.key_map.load().get(router_id).copied()
    }

    /// Snapshot of the current master node list
    pub fn master_nodes(&self) -> Arc<HashMap<RouterId, PublicKey>> {
        self.key_map.load_full()
    }
}

fn reply_body(data: Vec<String>) -> Result<String, DirectoryError> {
    let mut parts = data.into_iter();
    match (parts.next(), parts.next()) {
        (Some(status), Some(body)) if status == STATUS_OK => Ok(body),
        (Some(status), _) if status != STATUS_OK => Err(DirectoryError::Status(status)),
        _ => Err(DirectoryError::MalformedReply(
            "expected status and body".to_string(),
        )),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, DirectoryError> {
    serde_json::from_str(body).map_err(|e| DirectoryError::MalformedReply(e.to_string()))
}

fn error_reply(message: &str) -> Vec<String> {
    vec![json!({ "error": message }).to_string()]
}
