use crate::config::PartnerFile;
use crate::gate::AccessGate;
use crate::metabase::MetabaseClient;
use crate::resolver::FetchStrategy;
use chrono::FixedOffset;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub metabase: Arc<MetabaseClient>,
    pub partners: Arc<PartnerFile>,
    pub fetch_strategy: FetchStrategy,
    pub utc_offset: FixedOffset,
}

impl AppState {
    pub fn new(
        gate: AccessGate,
        metabase: MetabaseClient,
        partners: PartnerFile,
        fetch_strategy: FetchStrategy,
        utc_offset: FixedOffset,
    ) -> Self {
        Self {
            gate: Arc::new(gate),
            metabase: Arc::new(metabase),
            partners: Arc::new(partners),
            fetch_strategy,
            utc_offset,
        }
    }
}
