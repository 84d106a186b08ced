//! Background settlement of one lifecycle operation.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::inflight::InFlightGuard;
use crate::domain::{
    Activity, ActivityRepository, ActivityState, Asset, AssetMutation, AssetRepository,
    BlockchainClient, TxData,
};

/// Work handed to the worker pool once an operation's activity is recorded.
pub(crate) struct Settlement {
    pub assets: Arc<dyn AssetRepository>,
    pub activities: Arc<dyn ActivityRepository>,
    pub chain: Arc<dyn BlockchainClient>,
    pub operation: &'static str,
    pub activity: Activity,
    /// Asset as read during validation; its version guards the final write.
    pub asset: Asset,
    pub tx: TxData,
    pub mutation: AssetMutation,
    pub _in_flight: InFlightGuard,
}

impl Settlement {
    /// Settles the transaction and applies the asset mutation.
    ///
    /// Returns the activity's final state. The asset is only written after
    /// the chain reported success.
    #[instrument(
        skip(self),
        fields(
            operation = self.operation,
            content_hash = %self.activity.content_hash,
            activity_id = self.activity.id
        )
    )]
    pub async fn run(mut self) -> ActivityState {
        let submitted = match &self.tx {
            TxData::AlreadySent(tx_hash) => Ok(tx_hash.clone()),
            TxData::Signed(raw) => self.chain.submit_transaction(raw).await,
        };

        let tx_hash = match submitted {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                warn!(error = %e, "Transaction submission failed, asset left unchanged");
                return self.finish(ActivityState::Failed).await;
            }
        };

        self.activity.tx_hash = Some(tx_hash.clone());
        self.activity.state = ActivityState::Success;
        if let Err(e) = self.activities.update_activity(&self.activity).await {
            error!(
                error = %e,
                tx_hash = %tx_hash,
                "Failed to record settled transaction, asset left unchanged"
            );
            return self.finish(ActivityState::Failed).await;
        }

        let mut updated = self.asset.clone();
        self.mutation.apply(&mut updated);
        if let Err(e) = self.assets.update_asset(&updated).await {
            error!(
                error = %e,
                tx_hash = %tx_hash,
                "Transaction settled on chain but the asset update failed; records diverge"
            );
            return self.finish(ActivityState::Failed).await;
        }

        info!(tx_hash = %tx_hash, "Settlement complete");
        self.record(ActivityState::Success);
        ActivityState::Success
    }

    async fn finish(mut self, state: ActivityState) -> ActivityState {
        self.activity.state = state;
        if let Err(e) = self.activities.update_activity(&self.activity).await {
            error!(error = %e, state = %state, "Failed to persist final activity state");
        }
        self.record(state);
        state
    }

    fn record(&self, state: ActivityState) {
        metrics::counter!(
            "asset_settlements_total",
            "operation" => self.operation,
            "outcome" => state.as_str()
        )
        .increment(1);
    }
}
