//! Line-oriented command interpreter over a [`Session`].
//!
//! Each line is one command; the reply is plain text or, with `json`
//! set, the serialized result.

use serde::Serialize;

use crate::error::{ParseError, Result};
use crate::io::{parse_address, to_json};
use crate::policy::EvictionPolicy;
use crate::session::{Session, SimConfig};
use crate::translation::{self, PageIndices};

pub const HELP: &str = "\
Commands:
  tlb init [size] [policy]      Initialize TLB (policy: LRU, FIFO, RANDOM, CLOCK)
  tlb lookup <addr>             Lookup address in TLB
  tlb access <addr> [pfn]       Access address (lookup + insert on miss)
  tlb insert <vpn> <pfn> [d]    Insert a mapping, 'd' marks it dirty
  tlb invalidate <addr>         Drop the entry for an address
  tlb status                    Show TLB contents and statistics
  tlb flush                     Flush all TLB entries and statistics
  tlb reset                     Reset statistics, keep entries
  paging init [frames] [policy] Initialize paging
  paging access <addr>          Access a page (may cause page fault)
  paging run <addr>...          Access pages in order
  paging status                 Show physical memory frames and statistics
  paging flush                  Clear all frames and statistics
  paging reset                  Reset statistics, keep frames
  decode <addr>                 Break an address into page-table indices
  help                          Show this help message
  exit                          Exit the shell";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Exit,
}

pub struct Shell {
    session: Session,
    json: bool,
    seed: Option<u64>,
}

#[derive(Serialize)]
struct Decoded {
    virtual_addr: u64,
    vpn: u64,
    indices: PageIndices,
    binary: String,
}

impl Shell {
    pub fn new(json: bool, seed: Option<u64>) -> Self {
        Shell {
            session: Session::new(),
            json,
            seed,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn execute(&mut self, line: &str) -> Result<Reply> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, rest)) = words.split_first() else {
            return Ok(Reply::Text(String::new()));
        };

        let text = match cmd {
            "exit" | "quit" | "q" => return Ok(Reply::Exit),
            "help" | "?" => HELP.to_string(),
            "decode" => self.decode(rest)?,
            "tlb" => self.tlb(rest)?,
            "paging" => self.paging(rest)?,
            other => format!("Unknown command: {}\nType 'help' for available commands.", other),
        };
        Ok(Reply::Text(text))
    }

    fn render<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<String> {
        if self.json { to_json(value) } else { Ok(text()) }
    }

    fn decode(&self, args: &[&str]) -> Result<String> {
        let va = parse_address(first(args)?)?;
        let d = Decoded {
            virtual_addr: va,
            vpn: translation::vpn(va),
            indices: PageIndices::from_raw(va),
            binary: translation::format_binary(va),
        };
        self.render(&d, || {
            format!(
                "VA {:#x}: VPN {:#x} {}\nBinary (48-bit): {}",
                d.virtual_addr, d.vpn, d.indices, d.binary
            )
        })
    }

    fn tlb(&mut self, args: &[&str]) -> Result<String> {
        let Some((&sub, rest)) = args.split_first() else {
            return Ok("Usage: tlb <init|lookup|access|insert|invalidate|status|flush|reset> [args]".into());
        };

        match sub {
            "init" => {
                let config = self.config(rest, SimConfig::tlb_default())?;
                self.session.configure_tlb(config)?;
                Ok(format!(
                    "[OK] TLB initialized with {} entries ({} replacement)",
                    config.capacity, config.policy
                ))
            }
            "lookup" => {
                let va = parse_address(first(rest)?)?;
                let vpn = translation::vpn(va);
                let found = self.session.tlb_lookup(va)?;
                self.render(&found, || match found {
                    Some(e) => format!("[TLB HIT] VPN {:#x} -> PFN {}", vpn, e),
                    None => format!("[TLB MISS] VPN {:#x} not found", vpn),
                })
            }
            "access" => {
                let va = parse_address(first(rest)?)?;
                let pfn = rest.get(1).map(|t| parse_address(t)).transpose()?;
                let r = self.session.tlb_access(va, pfn)?;
                self.render(&r, || r.to_string())
            }
            "insert" => {
                let (vpn, pfn) = match rest {
                    [vpn, pfn, ..] => (parse_address(vpn)?, parse_address(pfn)?),
                    _ => return Ok("Usage: tlb insert <vpn> <pfn> [d]".into()),
                };
                let dirty = rest.get(2).is_some_and(|d| d.eq_ignore_ascii_case("d"));
                let evicted = self.session.tlb()?.with(|t| t.insert(vpn, pfn, dirty));
                self.render(&evicted, || match evicted {
                    Some(old) => format!("[TLB INSERT] VPN {:#x} -> PFN {:#x}, evicted VPN {:#x}", vpn, pfn, old),
                    None => format!("[TLB INSERT] VPN {:#x} -> PFN {:#x}", vpn, pfn),
                })
            }
            "invalidate" => {
                let vpn = translation::vpn(parse_address(first(rest)?)?);
                let found = self.session.tlb_invalidate(vpn)?;
                self.render(&found, || {
                    if found {
                        format!("[OK] VPN {:#x} invalidated", vpn)
                    } else {
                        format!("VPN {:#x} not in TLB", vpn)
                    }
                })
            }
            "status" => {
                let snap = self.session.tlb_inspect()?;
                self.render(&snap, || format!("TLB STATUS\n{}", snap))
            }
            "flush" => {
                self.session.tlb_flush()?;
                Ok("[OK] TLB flushed".into())
            }
            "reset" => {
                self.session.tlb_reset_stats()?;
                Ok("[OK] TLB statistics reset".into())
            }
            other => Ok(format!("Unknown TLB command: {}", other)),
        }
    }

    fn paging(&mut self, args: &[&str]) -> Result<String> {
        let Some((&sub, rest)) = args.split_first() else {
            return Ok("Usage: paging <init|access|run|status|flush|reset> [args]".into());
        };

        match sub {
            "init" => {
                let config = self.config(rest, SimConfig::paging_default())?;
                self.session.configure_paging(config)?;
                Ok(format!(
                    "[OK] Paging simulator initialized with {} frames ({} replacement)",
                    config.capacity, config.policy
                ))
            }
            "access" => {
                let vpn = translation::vpn(parse_address(first(rest)?)?);
                let r = self.session.paging_access(vpn)?;
                self.render(&r, || r.to_string())
            }
            "run" => {
                let vpns = rest
                    .iter()
                    .map(|t| parse_address(t).map(translation::vpn))
                    .collect::<std::result::Result<Vec<_>, ParseError>>()?;
                let results = self.session.paging_sequence(&vpns)?;
                self.render(&results, || {
                    results.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
                })
            }
            "status" => {
                let snap = self.session.paging_inspect()?;
                self.render(&snap, || format!("PAGING SIMULATOR STATUS\n{}", snap))
            }
            "flush" => {
                self.session.paging_flush()?;
                Ok("[OK] Paging simulator flushed".into())
            }
            "reset" => {
                self.session.paging_reset_stats()?;
                Ok("[OK] Paging statistics reset".into())
            }
            other => Ok(format!("Unknown paging command: {}", other)),
        }
    }

    fn config(&self, args: &[&str], default: SimConfig) -> Result<SimConfig> {
        let capacity = match args.first() {
            Some(t) => t
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidNumber(t.to_string()))?,
            None => default.capacity,
        };
        let policy = match args.get(1) {
            Some(p) => p.parse::<EvictionPolicy>()?,
            None => default.policy,
        };
        Ok(SimConfig::new(capacity, policy).with_seed(self.seed))
    }
}

fn first<'a>(args: &[&'a str]) -> std::result::Result<&'a str, ParseError> {
    args.first().copied().ok_or(ParseError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, SimError};

    fn text(shell: &mut Shell, line: &str) -> String {
        match shell.execute(line).unwrap() {
            Reply::Text(t) => t,
            Reply::Exit => panic!("unexpected exit for {:?}", line),
        }
    }

    #[test]
    fn test_commands_before_init() {
        let mut sh = Shell::new(false, None);
        let err = sh.execute("tlb access 0x1000").unwrap_err();
        assert!(err.to_string().contains("initialize the simulator first"));
        assert!(matches!(sh.execute("paging status"), Err(SimError::NotInitialized("paging"))));
    }

    #[test]
    fn test_tlb_session() {
        let mut sh = Shell::new(false, None);
        assert!(text(&mut sh, "tlb init 8 lru").contains("8 entries (LRU"));
        assert!(text(&mut sh, "tlb access 0x1000").starts_with("[TLB MISS] VPN 0x1"));
        assert!(text(&mut sh, "tlb access 0x2000").starts_with("[TLB MISS] VPN 0x2"));
        assert!(text(&mut sh, "tlb lookup 0x1abc").starts_with("[TLB HIT] VPN 0x1"));
        assert!(text(&mut sh, "tlb invalidate 0x1000").contains("invalidated"));
        assert!(text(&mut sh, "tlb lookup 0x1000").contains("not found"));

        let status = text(&mut sh, "tlb status");
        assert!(status.contains("TLB STATUS"));
        assert!(status.contains("Hits: 1"));

        assert_eq!(text(&mut sh, "tlb reset"), "[OK] TLB statistics reset");
        assert_eq!(text(&mut sh, "tlb flush"), "[OK] TLB flushed");
    }

    #[test]
    fn test_tlb_insert_dirty() {
        let mut sh = Shell::new(false, None);
        text(&mut sh, "tlb init 1");
        assert_eq!(text(&mut sh, "tlb insert 0x5 0x50 d"), "[TLB INSERT] VPN 0x5 -> PFN 0x50");
        assert!(text(&mut sh, "tlb lookup 0x5000").ends_with("PFN 0x50 D"));
        assert!(text(&mut sh, "tlb insert 0x6 0x60").contains("evicted VPN 0x5"));
    }

    #[test]
    fn test_paging_session() {
        let mut sh = Shell::new(false, None);
        text(&mut sh, "paging init 4 fifo");
        let out = text(&mut sh, "paging run 0x1000 0x2000 0x3000 0x4000 0x5000");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], "[PAGE FAULT] VPN 0x5 not in memory, evicted VPN 0x1 from Frame 0");
        assert_eq!(
            text(&mut sh, "paging access 0x1000"),
            "[PAGE FAULT] VPN 0x1 not in memory, evicted VPN 0x2 from Frame 1"
        );
        assert!(text(&mut sh, "paging status").contains("Misses: 6"));
    }

    #[test]
    fn test_bad_config_reported() {
        let mut sh = Shell::new(false, None);
        assert!(matches!(
            sh.execute("tlb init 0"),
            Err(SimError::Config(ConfigError::InvalidCapacity(0)))
        ));
        assert!(matches!(
            sh.execute("paging init 4 mru"),
            Err(SimError::Config(ConfigError::UnknownPolicy(_)))
        ));
        assert!(matches!(sh.execute("paging init -3"), Err(SimError::Parse(_))));
        assert!(matches!(sh.execute("tlb init 300"), Err(SimError::Config(_))));
    }

    #[test]
    fn test_json_replies() {
        let mut sh = Shell::new(true, Some(1));
        text(&mut sh, "paging init 2 random");
        let out = text(&mut sh, "paging access 0x1000");
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["vpn"], 1);
        assert_eq!(v["fault"], true);

        let status: serde_json::Value = serde_json::from_str(&text(&mut sh, "paging status")).unwrap();
        assert_eq!(status["capacity"], 2);
        assert_eq!(status["policy"], "Random");
        assert_eq!(status["slots"][0]["payload"], 1);
    }

    #[test]
    fn test_decode_and_misc() {
        let mut sh = Shell::new(false, None);
        let out = text(&mut sh, "decode 0x7fffffffe123");
        assert!(out.contains("VPN 0x7fffffffe"));
        assert!(out.contains("offset=0x123"));
        assert!(text(&mut sh, "help").contains("paging run"));
        assert!(text(&mut sh, "bogus").starts_with("Unknown command: bogus"));
        assert_eq!(text(&mut sh, "   "), "");
        assert_eq!(sh.execute("exit").unwrap(), Reply::Exit);
    }
}
