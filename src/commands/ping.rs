use anyhow::Result;
use std::time::Instant;

use crate::cli::ConnectArgs;

pub fn cmd_ping(conn: &ConnectArgs) -> Result<()> {
    let start = Instant::now();
    // connect() already pings once as part of startup
    let endpoint = conn.endpoint()?;
    endpoint.connect(conn.session_config())?;
    println!("{}: ok ({:.1}ms)", endpoint, start.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}
