pub mod client;
pub mod connectivity;
pub mod session;

pub use client::{AccessToken, AnalysisScores, Analyzer, CloudError, CloudSettings, KubiosClient};
pub use connectivity::{ConnectivityManager, ConnectivityState, Link, RetryPolicy, TcpProbeLink};
pub use session::AnalysisSession;
