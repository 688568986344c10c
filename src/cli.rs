//! Line-oriented front end: reads payloads until `exit`, prints one report
//! per mined block and the whole chain at the end.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use anyhow::Context;
use log::warn;

use crate::blockchain::{
    Blockchain, ChainConfig, LogObserver, MiningObserver, MiningProgress, MiningReport,
};

/// Case-insensitive command that ends the input loop.
pub const EXIT_COMMAND: &str = "exit";

/// Session output shared between the input loop and mining telemetry.
struct Session<'a, W> {
    out: Mutex<&'a mut W>,
}

impl<'a, W: Write> Session<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn with_out<T>(&self, f: impl FnOnce(&mut W) -> io::Result<T>) -> io::Result<T> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("session output lock poisoned"))?;
        f(&mut **out)
    }

    fn prompt(&self, text: &str) -> io::Result<()> {
        self.with_out(|out| {
            write!(out, "{text}")?;
            out.flush()
        })
    }
}

/// Telemetry is echoed to the session on a best-effort basis; a failed write
/// never interrupts mining.
impl<W: Write + Send> MiningObserver for Session<'_, W> {
    fn on_progress(&self, p: &MiningProgress) {
        LogObserver.on_progress(p);
        let _ = self.with_out(|out| {
            writeln!(
                out,
                "Iteration: {} | {:.0} H/s | {} ms",
                p.attempts,
                p.hash_rate(),
                p.elapsed.as_millis()
            )
        });
    }

    fn on_mined(&self, r: &MiningReport) {
        LogObserver.on_mined(r);
        let _ = self.with_out(|out| {
            writeln!(out, "Time : {} milliseconds", r.elapsed.as_millis())?;
            writeln!(out, "Block mined! Hash: {}", r.hash)?;
            writeln!(out, "Number of iterations: {}", r.iterations)
        });
    }
}

/// Run the interactive session and return the resulting chain.
pub fn run<R: BufRead, W: Write + Send>(
    input: R,
    out: &mut W,
    config: &ChainConfig,
    json: bool,
) -> anyhow::Result<Blockchain> {
    let session = Session::new(out);
    let mut lines = input.lines();

    session.prompt("Enter data for the Genesis Block: ")?;
    let genesis = lines
        .next()
        .transpose()
        .context("failed to read genesis data")?
        .context("input ended before genesis data was given")?;

    let mut chain = Blockchain::with_config(genesis, config.clone(), &session)
        .context("failed to mine the genesis block")?;

    loop {
        session.prompt("Enter data for the block (or type 'exit' to stop): ")?;
        let Some(line) = lines.next().transpose().context("failed to read block data")? else {
            session.with_out(|out| writeln!(out))?;
            break;
        };
        if line.trim().eq_ignore_ascii_case(EXIT_COMMAND) {
            break;
        }

        if let Err(e) = chain.try_append(line, &session) {
            warn!("block not added: {e}");
            session.with_out(|out| writeln!(out, "Block not added: {e}"))?;
        }
    }

    let rendered = if json {
        chain.to_json().context("failed to render chain as JSON")?
    } else {
        chain.to_string()
    };
    session.with_out(|out| {
        writeln!(out, "Exiting the blockchain...")?;
        writeln!(out, "\nCurrent Blockchain:")?;
        writeln!(out, "{rendered}")
    })?;

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::blockchain::MiningOptions;

    fn config(difficulty: u32) -> ChainConfig {
        ChainConfig {
            difficulty,
            mining: MiningOptions::default(),
        }
    }

    fn session(script: &str, config: &ChainConfig, json: bool) -> (Blockchain, String) {
        let mut out = Vec::new();
        let chain = run(Cursor::new(script.to_string()), &mut out, config, json).expect("session");
        (chain, String::from_utf8(out).expect("utf8 output"))
    }

    #[test]
    fn builds_chain_until_exit() {
        let (chain, out) = session("Genesis Block\ntx1\ntx2\nEXIT\nignored\n", &config(1), false);
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.blocks()[0].data(), "Genesis Block");
        assert_eq!(chain.blocks()[2].data(), "tx2");
        assert_eq!(out.matches("Block mined! Hash: 0").count(), 3);
        assert_eq!(out.matches("Number of iterations: ").count(), 3);
        assert!(out.contains("Exiting the blockchain..."));
        assert!(out.contains("\nCurrent Blockchain:\n"));
        assert!(out.trim_end().ends_with("The blockchain is valid"));
        assert!(!out.contains("ignored"));
    }

    #[test]
    fn exit_command_ignores_case_and_whitespace() {
        let (chain, _) = session("g\n  eXiT \n", &config(1), false);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn end_of_input_acts_as_exit() {
        let (chain, out) = session("g\nonly", &config(1), false);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.latest().data(), "only");
        assert!(out.contains("Exiting the blockchain..."));
    }

    #[test]
    fn missing_genesis_is_an_error() {
        let mut out = Vec::new();
        let err = run(Cursor::new(String::new()), &mut out, &config(1), false).unwrap_err();
        assert!(err.to_string().contains("genesis"));
    }

    /// Raises the cancel flag once anything past the genesis line is read.
    struct CancelAfterGenesis {
        inner: Cursor<Vec<u8>>,
        genesis_len: u64,
        flag: Arc<AtomicBool>,
    }

    impl Read for CancelAfterGenesis {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl BufRead for CancelAfterGenesis {
        fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
            self.inner.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt);
            if self.inner.position() > self.genesis_len {
                self.flag.store(true, Ordering::Relaxed);
            }
        }
    }

    #[test]
    fn failed_append_keeps_the_session_going() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut cfg = config(1);
        cfg.mining.cancel = Some(flag.clone());
        let input = CancelAfterGenesis {
            inner: Cursor::new(b"g\na\nb\nexit\n".to_vec()),
            genesis_len: 2,
            flag,
        };

        let mut out = Vec::new();
        let chain = run(input, &mut out, &cfg, false).expect("session");
        let out = String::from_utf8(out).expect("utf8 output");

        assert_eq!(chain.len(), 1);
        assert_eq!(out.matches("Block not added: mining block #1 failed").count(), 2);
        assert!(out.trim_end().ends_with("The blockchain is valid"));
    }

    #[test]
    fn failed_genesis_is_an_error() {
        let mut strict = config(64);
        strict.mining.max_attempts = Some(2);
        let mut out = Vec::new();
        let err = run(Cursor::new("g\n".to_string()), &mut out, &strict, false).unwrap_err();
        assert!(format!("{err:#}").contains("no valid nonce within 2 attempts"));
    }

    #[test]
    fn progress_is_echoed_to_the_session() {
        let mut cfg = config(3);
        cfg.mining.progress_interval = 10;
        let (chain, out) = session("g\nexit\n", &cfg, false);
        let nonce = chain.latest().nonce();
        assert_eq!(out.matches("Iteration: ").count() as u64, nonce / 10);
        if nonce >= 10 {
            assert!(out.contains("Iteration: 10 | "));
        }
        assert!(out.contains(&format!("Number of iterations: {nonce}\n")));
    }

    #[test]
    fn json_output() {
        let (_, out) = session("g\nx\nexit\n", &config(1), true);
        let start = out.find('{').expect("json object");
        let json: serde_json::Value = serde_json::from_str(out[start..].trim()).expect("json");
        assert_eq!(json["length"], 2);
        assert_eq!(json["valid"], true);
        assert_eq!(json["chain"][1]["data"], "x");
    }
}
