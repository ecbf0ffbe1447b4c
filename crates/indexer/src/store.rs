//! Record store access
//!
//! The store holds the externally visible state. [`RestStore`] talks to the
//! REST API; [`MemoryStore`] keeps everything in process.

use alloy_primitives::Address;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use raffle_sync_core::{
    DrawRecord, DrawUpdate, Family, ProofRecord, Registration, Withdrawal, WinnerRecord,
};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::error::{IndexerError, IndexerResult};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_draw(&self, family: Family, draw: Address) -> IndexerResult<Option<DrawRecord>>;

    async fn create_draw(&self, family: Family, record: &DrawRecord) -> IndexerResult<()>;

    /// Write only the fields present in `update`.
    async fn update_draw(
        &self,
        family: Family,
        draw: Address,
        update: &DrawUpdate,
    ) -> IndexerResult<()>;

    /// Registrations in the order they were appended
    async fn registrations(&self, family: Family, draw: Address)
        -> IndexerResult<Vec<Registration>>;

    async fn add_registration(
        &self,
        family: Family,
        registration: &Registration,
    ) -> IndexerResult<()>;

    async fn add_withdrawal(&self, family: Family, withdrawal: &Withdrawal) -> IndexerResult<()>;

    async fn add_winner(&self, winner: &WinnerRecord) -> IndexerResult<()>;

    async fn add_proof(&self, proof: &ProofRecord) -> IndexerResult<()>;
}

/// REST client authenticated with a static API key
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    authorization: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: format!("Api-Key {}", api_key),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> IndexerResult<Option<T>> {
        let response = self
            .client
            .get(self.url(path))
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| IndexerError::StoreRead(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| IndexerError::StoreRead(e.to_string()))?;

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| IndexerError::StoreRead(format!("{path}: {e}")))
    }

    async fn post_json<B: Serialize + ?Sized + Sync>(&self, path: &str, body: &B) -> IndexerResult<()> {
        self.client
            .post(self.url(path))
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .json(body)
            .send()
            .await
            .map_err(|e| IndexerError::StoreWrite(e.to_string()))?
            .error_for_status()
            .map_err(|e| IndexerError::StoreWrite(e.to_string()))?;
        Ok(())
    }
}

fn record_path(family: Family, draw: Address) -> String {
    format!("{}/{:?}/", family.collection(), draw)
}

#[async_trait]
impl RecordStore for RestStore {
    async fn get_draw(&self, family: Family, draw: Address) -> IndexerResult<Option<DrawRecord>> {
        let records: Option<Vec<DrawRecord>> = self.get_json(&record_path(family, draw)).await?;
        Ok(records.and_then(|r| r.into_iter().next()))
    }

    async fn create_draw(&self, family: Family, record: &DrawRecord) -> IndexerResult<()> {
        self.post_json(&format!("{}/", family.collection()), record)
            .await
    }

    async fn update_draw(
        &self,
        family: Family,
        draw: Address,
        update: &DrawUpdate,
    ) -> IndexerResult<()> {
        self.post_json(&record_path(family, draw), update).await
    }

    async fn registrations(
        &self,
        family: Family,
        draw: Address,
    ) -> IndexerResult<Vec<Registration>> {
        let path = format!("{}-registry/{:?}/", family.collection(), draw);
        Ok(self.get_json(&path).await?.unwrap_or_default())
    }

    async fn add_registration(
        &self,
        family: Family,
        registration: &Registration,
    ) -> IndexerResult<()> {
        self.post_json(&format!("{}-registry/", family.collection()), registration)
            .await
    }

    async fn add_withdrawal(&self, family: Family, withdrawal: &Withdrawal) -> IndexerResult<()> {
        self.post_json(&format!("{}-withdrawed/", family.collection()), withdrawal)
            .await
    }

    async fn add_winner(&self, winner: &WinnerRecord) -> IndexerResult<()> {
        self.post_json("winners/", winner).await
    }

    async fn add_proof(&self, proof: &ProofRecord) -> IndexerResult<()> {
        self.post_json("merkles/", proof).await
    }
}

/// In-process store with the same partial-update semantics as the REST API
#[derive(Default)]
pub struct MemoryStore {
    draws: DashMap<(Family, Address), DrawRecord>,
    registrations: DashMap<(Family, Address), Vec<Registration>>,
    update_counts: DashMap<(Family, Address), usize>,
    withdrawals: Mutex<Vec<(Family, Withdrawal)>>,
    winners: Mutex<Vec<WinnerRecord>>,
    proofs: Mutex<Vec<ProofRecord>>,
    rejected_proofs: DashSet<Address>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&self, family: Family, draw: Address) -> Option<DrawRecord> {
        self.draws.get(&(family, draw)).map(|r| r.clone())
    }

    pub fn insert_draw(&self, family: Family, record: DrawRecord) {
        self.draws.insert((family, record.draw_id), record);
    }

    pub fn registered(&self, family: Family, draw: Address) -> Vec<Registration> {
        self.registrations
            .get(&(family, draw))
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of partial updates written for a draw
    pub fn update_count(&self, family: Family, draw: Address) -> usize {
        self.update_counts
            .get(&(family, draw))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub async fn withdrawals(&self) -> Vec<(Family, Withdrawal)> {
        self.withdrawals.lock().await.clone()
    }

    pub async fn winners(&self) -> Vec<WinnerRecord> {
        self.winners.lock().await.clone()
    }

    pub async fn proofs(&self) -> Vec<ProofRecord> {
        self.proofs.lock().await.clone()
    }

    /// Fail every proof write for `wallet`.
    pub fn reject_proofs_for(&self, wallet: Address) {
        self.rejected_proofs.insert(wallet);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_draw(&self, family: Family, draw: Address) -> IndexerResult<Option<DrawRecord>> {
        Ok(self.draw(family, draw))
    }

    async fn create_draw(&self, family: Family, record: &DrawRecord) -> IndexerResult<()> {
        let key = (family, record.draw_id);
        if self.draws.contains_key(&key) {
            return Err(IndexerError::StoreWrite(format!(
                "{} {:?} already exists",
                family, record.draw_id
            )));
        }
        self.draws.insert(key, record.clone());
        Ok(())
    }

    async fn update_draw(
        &self,
        family: Family,
        draw: Address,
        update: &DrawUpdate,
    ) -> IndexerResult<()> {
        let mut record = self
            .draws
            .get_mut(&(family, draw))
            .ok_or_else(|| IndexerError::StoreWrite(format!("{} {:?} not found", family, draw)))?;
        update.apply_to(&mut record);
        drop(record);
        *self.update_counts.entry((family, draw)).or_default() += 1;
        Ok(())
    }

    async fn registrations(
        &self,
        family: Family,
        draw: Address,
    ) -> IndexerResult<Vec<Registration>> {
        Ok(self.registered(family, draw))
    }

    async fn add_registration(
        &self,
        family: Family,
        registration: &Registration,
    ) -> IndexerResult<()> {
        self.registrations
            .entry((family, registration.draw_id))
            .or_default()
            .push(registration.clone());
        Ok(())
    }

    async fn add_withdrawal(&self, family: Family, withdrawal: &Withdrawal) -> IndexerResult<()> {
        self.withdrawals
            .lock()
            .await
            .push((family, withdrawal.clone()));
        Ok(())
    }

    async fn add_winner(&self, winner: &WinnerRecord) -> IndexerResult<()> {
        self.winners.lock().await.push(winner.clone());
        Ok(())
    }

    async fn add_proof(&self, proof: &ProofRecord) -> IndexerResult<()> {
        if self.rejected_proofs.contains(&proof.wallet) {
            return Err(IndexerError::StoreWrite(format!(
                "proof for {:?} rejected",
                proof.wallet
            )));
        }
        self.proofs.lock().await.push(proof.clone());
        Ok(())
    }
}
