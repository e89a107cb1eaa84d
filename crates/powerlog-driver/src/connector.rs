use powerlog_transport::{Connection, TransportConfig};
use tracing::info;

use crate::error::Result;
use crate::family::DeviceFamily;
use crate::instrument::Instrument;

/// Connect to an analyzer with the family's link, port and timeouts.
///
/// `port` overrides the family default, e.g. for a bridge on another port.
pub fn connect(host: &str, port: Option<u16>, family: DeviceFamily) -> Result<Instrument<Connection>> {
    connect_with_config(host, port, family, family.transport_config())
}

/// Connect with explicit transport timeouts.
pub fn connect_with_config(
    host: &str,
    port: Option<u16>,
    family: DeviceFamily,
    config: TransportConfig,
) -> Result<Instrument<Connection>> {
    let port = port.unwrap_or_else(|| family.default_port());
    let connection = Connection::open(family.link(), host, port, config)?;
    info!(%family, peer = %connection.peer(), "instrument connected");
    Ok(Instrument::new(connection, family))
}
