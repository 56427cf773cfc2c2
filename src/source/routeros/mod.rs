// MikroTik RouterOS API counter source: interface byte counters or the firewall
// connection table, polled over one long-lived API session.

pub mod codec;

use std::collections::HashMap;
use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use self::codec::{ReplyKind, encode_sentence, parse_reply, read_sentence};
use crate::error::{AccountingError, Result};
use crate::models::{EntityKind, RawSample, SampleBatch};

const INTERFACE_PRINT: &[&str] = &["/interface/print", "=.proplist=name,tx-byte,rx-byte"];
const CONNECTION_PRINT: &[&str] = &[
    "/ip/firewall/connection/print",
    "=.proplist=.id,src-address,dst-address,protocol,orig-bytes,repl-bytes",
];

#[derive(Debug, Error)]
pub enum RouterOsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Command rejected (`!trap`), e.g. bad credentials or unknown menu.
    #[error("router rejected command: {0}")]
    Trap(String),

    /// Router closed the session (`!fatal`).
    #[error("router closed session: {0}")]
    Fatal(String),
}

pub type Attributes = HashMap<String, String>;

type ApiResult<T> = std::result::Result<T, RouterOsError>;

/// One API session over any byte stream.
pub struct ApiConnection<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ApiConnection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Plain-text login (RouterOS 6.43 and later).
    pub async fn login(&mut self, username: &str, password: &str) -> ApiResult<()> {
        let name = format!("=name={}", username);
        let password = format!("=password={}", password);
        self.command(&["/login", &name, &password]).await?;
        Ok(())
    }

    /// Send one command and collect its `!re` records until `!done`.
    pub async fn command(&mut self, words: &[&str]) -> ApiResult<Vec<Attributes>> {
        let sentence = encode_sentence(words.iter().copied());
        self.stream.write_all(&sentence).await?;
        self.stream.flush().await?;

        let mut records = Vec::new();
        let mut trap: Option<String> = None;
        loop {
            let words = read_sentence(&mut self.stream).await?;
            if words.is_empty() {
                continue;
            }
            let reply = parse_reply(&words)?;
            match reply.kind {
                ReplyKind::Re => records.push(reply.attributes),
                ReplyKind::Empty => {}
                ReplyKind::Trap => {
                    trap.get_or_insert_with(|| reply.message().to_string());
                }
                ReplyKind::Fatal => {
                    return Err(RouterOsError::Fatal(reply.message().to_string()));
                }
                ReplyKind::Done => break,
            }
        }
        match trap {
            Some(message) => Err(RouterOsError::Trap(message)),
            None => Ok(records),
        }
    }
}

#[derive(Clone)]
pub struct RouterOsParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub entities: EntityKind,
}

pub struct RouterOsSource {
    params: RouterOsParams,
    conn: Option<ApiConnection<BufStream<TcpStream>>>,
}

impl RouterOsSource {
    pub fn new(params: RouterOsParams) -> Self {
        Self { params, conn: None }
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.params.entities
    }

    async fn connect(&self) -> ApiResult<ApiConnection<BufStream<TcpStream>>> {
        let addr = format!("{}:{}", self.params.host, self.params.port);
        let tcp = TcpStream::connect(&addr).await?;
        tcp.set_nodelay(true)?;
        let mut conn = ApiConnection::new(BufStream::new(tcp));
        conn.login(&self.params.username, &self.params.password).await?;
        info!(router = %addr, "Logged in to RouterOS API");
        Ok(conn)
    }

    /// The session is taken out for the duration of the query and only put back on
    /// success, so an error or a cancelled (timed-out) query never leaves a half-read
    /// session behind.
    async fn query(&mut self) -> ApiResult<Vec<Attributes>> {
        let mut conn = match self.conn.take() {
            Some(c) => c,
            None => self.connect().await?,
        };
        let command = match self.params.entities {
            EntityKind::Interfaces => INTERFACE_PRINT,
            EntityKind::Connections => CONNECTION_PRINT,
        };
        let records = conn.command(command).await?;
        self.conn = Some(conn);
        Ok(records)
    }

    pub async fn sample(&mut self) -> Result<SampleBatch> {
        let records = self.query().await.map_err(|e| {
            AccountingError::SourceUnavailable(format!(
                "{}:{}: {}",
                self.params.host, self.params.port, e
            ))
        })?;
        let captured_at = Utc::now();
        let batch = records_to_batch(self.params.entities, &records, captured_at)?;
        debug!(
            entities = batch.samples.len(),
            records = records.len(),
            "RouterOS sample"
        );
        Ok(batch)
    }
}

/// Turn print records into samples, skipping incomplete ones. Fails only when records
/// came back and none of them were usable.
pub fn records_to_batch(
    kind: EntityKind,
    records: &[Attributes],
    captured_at: DateTime<Utc>,
) -> Result<SampleBatch> {
    let mut samples = Vec::with_capacity(records.len());
    for record in records {
        let parsed = match kind {
            EntityKind::Interfaces => parse_interface(record, captured_at),
            EntityKind::Connections => parse_connection(record, captured_at),
        };
        match parsed {
            Ok(s) => samples.push(s),
            Err(e) => warn!(error = %e, kind = e.kind(), "Skipping entity this cycle"),
        }
    }
    if samples.is_empty() && !records.is_empty() {
        return Err(AccountingError::SourceUnavailable(format!(
            "all {} {} records malformed",
            records.len(),
            kind
        )));
    }
    Ok(SampleBatch::new(captured_at, samples))
}

fn field<'a>(record: &'a Attributes, key: &str, entity: &str) -> Result<&'a str> {
    record
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AccountingError::PartialEntityData(format!("{}: missing {}", entity, key))
        })
}

fn counter(record: &Attributes, key: &str, entity: &str) -> Result<u64> {
    let raw = field(record, key, entity)?;
    raw.parse().map_err(|_| {
        AccountingError::PartialEntityData(format!(
            "{}: {} = {:?} is not a counter",
            entity, key, raw
        ))
    })
}

pub fn parse_interface(record: &Attributes, captured_at: DateTime<Utc>) -> Result<RawSample> {
    let name = field(record, "name", "interface")?;
    Ok(RawSample {
        entity_id: name.to_string(),
        address: None,
        peer: None,
        protocol: None,
        tx_bytes: counter(record, "tx-byte", name)?,
        rx_bytes: counter(record, "rx-byte", name)?,
        captured_at,
    })
}

/// Connection id is the table's `.id` when present, else `src->dst/proto`.
/// `dst-address` and `protocol` are kept as `peer` and `protocol` when present.
pub fn parse_connection(record: &Attributes, captured_at: DateTime<Utc>) -> Result<RawSample> {
    let src = field(record, "src-address", "connection")?;
    let optional = |key: &str| record.get(key).filter(|v| !v.is_empty()).cloned();
    let peer = optional("dst-address");
    let protocol = optional("protocol");
    let entity_id = match optional(".id") {
        Some(id) => id,
        None => format!(
            "{}->{}/{}",
            src,
            peer.as_deref().unwrap_or("?"),
            protocol.as_deref().unwrap_or("?")
        ),
    };
    Ok(RawSample {
        tx_bytes: counter(record, "orig-bytes", &entity_id)?,
        rx_bytes: counter(record, "repl-bytes", &entity_id)?,
        address: Some(src.to_string()),
        peer,
        protocol,
        entity_id,
        captured_at,
    })
}
