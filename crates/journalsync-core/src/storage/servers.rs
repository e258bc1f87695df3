//! Remote server storage

use crate::error::{SyncError, SyncResult};
use crate::types::{RemoteServer, ServerId};
use redb::{ReadableTable, TableDefinition};

use super::Journal;

/// Table for remote servers (key: server ULID, value: JSON RemoteServer)
pub(crate) const SERVERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("servers");

impl Journal {
    // ═══════════════════════════════════════════════════════════════════════
    // Server Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Save a remote server.
    ///
    /// If a server with the same id already exists, it will be overwritten.
    pub fn save_server(&self, server: &RemoteServer) -> SyncResult<()> {
        let db = self.db_handle();
        let db_guard = db.read();
        let write_txn = db_guard.begin_write()?;
        {
            let mut table = write_txn.open_table(SERVERS_TABLE)?;
            let data =
                serde_json::to_vec(server).map_err(|e| SyncError::Serialization(e.to_string()))?;
            let key = server.id.to_string_repr();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a server by id
    ///
    /// Returns `None` if no server with the given id exists.
    pub fn load_server(&self, server_id: &ServerId) -> SyncResult<Option<RemoteServer>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(SERVERS_TABLE)?;
        let key = server_id.to_string_repr();

        match table.get(key.as_str())? {
            Some(v) => {
                let server: RemoteServer = serde_json::from_slice(v.value())
                    .map_err(|e| SyncError::Serialization(e.to_string()))?;
                Ok(Some(server))
            }
            None => Ok(None),
        }
    }

    /// Find a server by its id string or nickname
    pub fn find_server(&self, id_or_nickname: &str) -> SyncResult<Option<RemoteServer>> {
        let wanted = id_or_nickname
            .strip_prefix("server_")
            .unwrap_or(id_or_nickname);
        Ok(self
            .list_servers()?
            .into_iter()
            .find(|s| s.id.to_string_repr() == wanted || s.nickname == id_or_nickname))
    }

    /// Like [`find_server`](Self::find_server), but a missing server is an error
    pub fn require_server(&self, id_or_nickname: &str) -> SyncResult<RemoteServer> {
        self.find_server(id_or_nickname)?
            .ok_or_else(|| SyncError::ServerNotFound(id_or_nickname.to_string()))
    }

    pub fn list_servers(&self) -> SyncResult<Vec<RemoteServer>> {
        let db = self.db_handle();
        let db_guard = db.read();
        let read_txn = db_guard.begin_read()?;
        let table = read_txn.open_table(SERVERS_TABLE)?;

        let mut servers = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let server: RemoteServer = serde_json::from_slice(value.value())
                .map_err(|e| SyncError::Serialization(e.to_string()))?;
            servers.push(server);
        }
        Ok(servers)
    }
}
