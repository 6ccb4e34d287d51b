pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod model;
pub mod seed;
pub mod store;
pub mod tally;
pub mod validate;

pub use errors::VoteError;
pub use ledger::Ledger;

#[macro_export]
macro_rules! execute {
    ($block:block) => {
        {
            let res = || -> Result<_, $crate::errors::VoteError> {
                $block
            };
            res().map_err(|e| {
                if e.status().code >= 500 {
                    tracing::error!("{e}");
                }
                Custom(e.status(), e.to_string())
            })
        }
    };
}
