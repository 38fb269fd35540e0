use std::path::Path;

use evermem_serve::ServeConfig;

pub fn execute(cwd: &Path, bind: &str, port: Option<u16>) -> anyhow::Result<()> {
    let config = ServeConfig {
        bind: bind.to_string(),
        port: port.unwrap_or_else(ServeConfig::port_from_env),
        api_url: evermem_api::Config::from_env(cwd).api_url,
        store_root: evermem_store::store_root(),
    };
    tokio::runtime::Runtime::new()?.block_on(evermem_serve::serve(config))
}
