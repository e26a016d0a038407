//! Serve command handler

use anyhow::Result;

use apkg_core::Config;

use crate::server;

/// Run the upload/download server
pub async fn run(bind: Option<String>, config: &Config) -> Result<()> {
    let mut server_config = config.server.clone();
    if let Some(bind) = bind {
        server_config.bind = bind;
    }

    server::run(&server_config, config.export.clone()).await
}
