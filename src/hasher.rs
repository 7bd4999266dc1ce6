//! Hash engine
//!
//! Computes the hex digest of a file's content under a chosen
//! [`HashAlgorithm`], optionally normalizing line endings first.
//!
//! ## Streaming vs. normalized hashing
//!
//! Files that need no normalization are read in fixed 8 KiB chunks and fed to
//! a streaming digest, so memory use does not depend on file size. When the
//! [`LineEndingPolicy`] applies to a file, the whole file is read once,
//! decoded (UTF-8, falling back to Latin-1), its terminators rewritten, and
//! the re-encoded UTF-8 bytes are hashed.
//!
//! A file is considered text when its extension is in a fixed allow-list or
//! when its first KiB is non-empty and contains no NUL byte.
//!
//! ## Strategies
//!
//! [`BuiltinStrategy`] is always available. [`ExternalToolStrategy`] shells out
//! to a platform hashing program (`sha256sum`, `shasum -a 256`, `md5 -q`,
//! `certutil`) and is only used when enabled and detected; any failure of the
//! external program falls back to the built-in implementation.
//!
//! ```rust
//! use treesum::hasher::Hasher;
//! use treesum::types::{HashAlgorithm, LineEndingPolicy};
//!
//! # fn example() -> treesum::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("a.txt");
//! std::fs::write(&path, "hello")?;
//!
//! let hasher = Hasher::new(HashAlgorithm::Sha256, LineEndingPolicy::Auto);
//! assert_eq!(
//!     hasher.hash_file(&path)?,
//!     "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
//! );
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use crate::error::{Result, TreesumError};
use crate::types::{HashAlgorithm, LineEndingPolicy};
use digest::DynDigest;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::process::Command;
use tracing::{debug, trace};

/// Read size for streaming hashes
pub const CHUNK_SIZE: usize = 8192;

/// Number of leading bytes inspected when sniffing for text
pub const SNIFF_LEN: usize = 1024;

/// Extensions always treated as text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "py", "js", "html", "css", "xml", "json", "yaml", "yml", "md", "rst", "cfg", "ini",
    "conf", "log", "sql", "sh", "bat", "cmd", "ps1", "php", "rb", "pl", "java", "c", "cpp", "h",
    "hpp", "cs", "vb", "go", "rs", "swift", "kt", "scala",
];

/// Create a fresh digest accumulator for `algorithm`
pub fn new_digest(algorithm: HashAlgorithm) -> Box<dyn DynDigest> {
    use digest::Digest;
    match algorithm {
        HashAlgorithm::Md5 => Box::new(md5::Md5::new()),
        HashAlgorithm::Sha1 => Box::new(sha1::Sha1::new()),
        HashAlgorithm::Sha256 => Box::new(sha2::Sha256::new()),
        HashAlgorithm::Sha512 => Box::new(sha2::Sha512::new()),
    }
}

/// Hash an in-memory buffer
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut digest = new_digest(algorithm);
    digest.update(data);
    hex::encode(digest.finalize())
}

/// Stream a reader through the digest in [`CHUNK_SIZE`] reads
///
/// Returns the hex digest and the number of bytes consumed.
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<(String, u64)> {
    let mut digest = new_digest(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        digest.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((hex::encode(digest.finalize()), total))
}

/// Whether the extension of `path` is in the text allow-list
pub fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            TEXT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Whether a leading sample of a file looks like text
///
/// Empty samples and samples containing NUL are binary. Anything else decodes
/// as Latin-1 at worst, so it is text.
pub fn sample_is_text(sample: &[u8]) -> bool {
    !sample.is_empty() && !sample.contains(&0)
}

/// Whether `path` is a text file, by extension or by sniffing its first KiB
pub fn is_text_file(path: &Path) -> io::Result<bool> {
    if has_text_extension(path) {
        return Ok(true);
    }

    let mut sample = Vec::with_capacity(SNIFF_LEN);
    File::open(path)?
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut sample)?;
    Ok(sample_is_text(&sample))
}

/// Rewrite line terminators according to `policy`
///
/// Input that is not valid UTF-8 is decoded as Latin-1. The result is always
/// UTF-8. `Preserve` returns the input unchanged.
pub fn normalize_line_endings(content: &[u8], policy: LineEndingPolicy) -> Vec<u8> {
    if policy == LineEndingPolicy::Preserve {
        return content.to_vec();
    }

    let text: Cow<'_, str> = match std::str::from_utf8(content) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(content.iter().map(|&b| b as char).collect()),
    };
    let unix = text.replace("\r\n", "\n").replace('\r', "\n");

    match policy {
        LineEndingPolicy::Windows => unix.replace('\n', "\r\n").into_bytes(),
        _ => unix.into_bytes(),
    }
}

/// A way of turning a file into a hex digest
pub trait HashStrategy {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Hash the raw bytes of `path`
    fn hash_file(&self, path: &Path, algorithm: HashAlgorithm) -> Result<String>;
}

/// Streaming in-process implementation, always available
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinStrategy;

impl HashStrategy for BuiltinStrategy {
    fn name(&self) -> &str {
        "builtin"
    }

    fn hash_file(&self, path: &Path, algorithm: HashAlgorithm) -> Result<String> {
        let file = File::open(path).map_err(|e| TreesumError::file_read(path, e))?;
        let (hash, _) = hash_reader(file, algorithm).map_err(|e| TreesumError::file_read(path, e))?;
        Ok(hash)
    }
}

/// Hashing by delegating to a platform program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalToolStrategy {
    program: String,
    args: Vec<String>,
    algorithm: HashAlgorithm,
    output: ToolOutput,
}

/// Where the digest appears in a tool's standard output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolOutput {
    /// First whitespace-separated token of the first line (`sha256sum`, `md5 -q`)
    FirstToken,
    /// First line after the header that is entirely hex (`certutil`)
    HexLine,
}

impl ExternalToolStrategy {
    /// Look for a program able to produce `algorithm` digests
    ///
    /// Candidates are tried in order; the first one that answers `--version`
    /// (or prints a usage message) wins.
    pub fn detect(algorithm: HashAlgorithm) -> Option<Self> {
        let found = Self::candidates(algorithm)
            .into_iter()
            .find(|candidate| tool_available(&candidate.program));
        match &found {
            Some(tool) => debug!("Using native tool {} for {}", tool.program, algorithm),
            None => debug!("No native tool for {}, using builtin hashing", algorithm),
        }
        found
    }

    fn candidates(algorithm: HashAlgorithm) -> Vec<Self> {
        let tool = |program: &str, args: &[&str], output| Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            algorithm,
            output,
        };

        if cfg!(windows) {
            let name = algorithm.as_str().to_ascii_uppercase();
            return vec![tool("certutil", &["-hashfile", "{}", name.as_str()], ToolOutput::HexLine)];
        }

        let mut out = vec![tool(
            &format!("{}sum", algorithm.as_str()),
            &[],
            ToolOutput::FirstToken,
        )];
        match algorithm {
            HashAlgorithm::Md5 => out.push(tool("md5", &["-q"], ToolOutput::FirstToken)),
            HashAlgorithm::Sha1 => out.push(tool("shasum", &["-a", "1"], ToolOutput::FirstToken)),
            HashAlgorithm::Sha256 => {
                out.push(tool("shasum", &["-a", "256"], ToolOutput::FirstToken))
            }
            HashAlgorithm::Sha512 => {
                out.push(tool("shasum", &["-a", "512"], ToolOutput::FirstToken))
            }
        }
        out
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    fn command_for(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        let mut placed = false;
        for arg in &self.args {
            if arg == "{}" {
                cmd.arg(path);
                placed = true;
            } else {
                cmd.arg(arg);
            }
        }
        if !placed {
            cmd.arg(path);
        }
        cmd
    }

    fn parse_output(&self, stdout: &str) -> Option<String> {
        let is_digest = |s: &str| {
            s.len() == self.algorithm.hex_len() && s.chars().all(|c| c.is_ascii_hexdigit())
        };
        match self.output {
            ToolOutput::FirstToken => stdout
                .lines()
                .next()
                .and_then(|line| line.split_whitespace().next())
                .map(|token| token.trim_start_matches('\\').to_ascii_lowercase())
                .filter(|token| is_digest(token)),
            ToolOutput::HexLine => stdout
                .lines()
                .skip(1)
                .map(|line| line.split_whitespace().collect::<String>())
                .find(|line| is_digest(line))
                .map(|line| line.to_ascii_lowercase()),
        }
    }
}

impl HashStrategy for ExternalToolStrategy {
    fn name(&self) -> &str {
        &self.program
    }

    fn hash_file(&self, path: &Path, algorithm: HashAlgorithm) -> Result<String> {
        let tool_err = |message: String| TreesumError::ExternalTool {
            tool: self.program.clone(),
            message,
        };
        if algorithm != self.algorithm {
            return Err(tool_err(format!("configured for {}, asked for {}", self.algorithm, algorithm)));
        }

        let output = self
            .command_for(path)
            .output()
            .map_err(|e| tool_err(e.to_string()))?;
        if !output.status.success() {
            return Err(tool_err(format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.parse_output(&stdout)
            .ok_or_else(|| tool_err(format!("unrecognised output: {}", stdout.trim())))
    }
}

fn tool_available(program: &str) -> bool {
    ["--version", "--help", "-h"].iter().any(|flag| {
        match Command::new(program).arg(flag).output() {
            Ok(out) => {
                out.status.success()
                    || String::from_utf8_lossy(&out.stderr)
                        .to_ascii_lowercase()
                        .contains("usage")
            }
            Err(_) => false,
        }
    })
}

/// The hash engine: algorithm, line-ending policy and optional external tool
#[derive(Debug, Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    line_endings: LineEndingPolicy,
    native_tool: bool,
    external: Option<ExternalToolStrategy>,
}

impl Hasher {
    /// Built-in hashing only
    pub fn new(algorithm: HashAlgorithm, line_endings: LineEndingPolicy) -> Self {
        Self {
            algorithm,
            line_endings,
            native_tool: false,
            external: None,
        }
    }

    /// Enable or disable the external tool, probing for it when enabled
    pub fn with_native_tool(mut self, enabled: bool) -> Self {
        self.native_tool = enabled;
        self.external = if enabled {
            ExternalToolStrategy::detect(self.algorithm)
        } else {
            None
        };
        self
    }

    /// Use a specific external strategy (falls back to builtin on failure)
    pub fn with_external(mut self, strategy: ExternalToolStrategy) -> Self {
        self.native_tool = true;
        self.external = Some(strategy);
        self
    }

    /// Same settings, different algorithm
    pub fn for_algorithm(&self, algorithm: HashAlgorithm) -> Self {
        if algorithm == self.algorithm {
            return self.clone();
        }
        Hasher::new(algorithm, self.line_endings).with_native_tool(self.native_tool)
    }

    /// Configured algorithm
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Configured line-ending policy
    pub fn line_endings(&self) -> LineEndingPolicy {
        self.line_endings
    }

    /// Name of the detected external tool, if any
    pub fn external_tool(&self) -> Option<&str> {
        self.external.as_ref().map(|t| t.program())
    }

    /// Whether the line-ending policy rewrites `path` before hashing
    pub fn needs_normalization(&self, path: &Path) -> io::Result<bool> {
        if self.line_endings == LineEndingPolicy::Preserve {
            return Ok(false);
        }
        is_text_file(path)
    }

    /// Hash a file under the configured algorithm and policy
    ///
    /// # Errors
    ///
    /// [`TreesumError::FileRead`] if the file cannot be opened or read.
    pub fn hash_file(&self, path: &Path) -> Result<String> {
        if self
            .needs_normalization(path)
            .map_err(|e| TreesumError::file_read(path, e))?
        {
            let content = std::fs::read(path).map_err(|e| TreesumError::file_read(path, e))?;
            trace!("Normalizing {:?} ({}) before hashing", path, self.line_endings);
            return Ok(hash_bytes(
                &normalize_line_endings(&content, self.line_endings),
                self.algorithm,
            ));
        }

        if let Some(tool) = &self.external {
            match tool.hash_file(path, self.algorithm) {
                Ok(hash) => return Ok(hash),
                Err(e) => debug!("Native tool failed for {:?}, using builtin: {}", path, e),
            }
        }

        BuiltinStrategy.hash_file(path, self.algorithm)
    }
}
