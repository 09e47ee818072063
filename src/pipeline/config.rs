//! Immutable run configuration, assembled from `KEY=value` files and command-line arguments.

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use crate::{
    ext,
    err::{Error, validate_param, add_path},
    steps::StepKind,
};
use super::{
    tools::Tools,
    status::Rerun,
};

/// Default name of the file with database locations.
pub const DB_CONFIG: &str = "database_config.txt";

/// Which assembler(s) to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assembler {
    Megahit,
    Spades,
    Both,
}

impl Assembler {
    pub fn to_str(self) -> &'static str {
        match self {
            Self::Megahit => "megahit",
            Self::Spades => "spades",
            Self::Both => "both",
        }
    }

    pub fn runs_megahit(self) -> bool {
        self != Self::Spades
    }

    pub fn runs_spades(self) -> bool {
        self != Self::Megahit
    }
}

impl FromStr for Assembler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase() as &str {
            "megahit" => Ok(Self::Megahit),
            "spades" | "metaspades" => Ok(Self::Spades),
            "both" | "all" => Ok(Self::Both),
            _ => Err(format!("Unknown assembler {:?}", s)),
        }
    }
}

impl fmt::Display for Assembler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// Locations of reference databases. All of them are optional at load time,
/// steps decide which of them they cannot work without.
#[derive(Clone, Debug, Default)]
pub struct Databases {
    /// Bowtie2 index prefix of the host genome.
    pub host_index: Option<PathBuf>,
    pub kraken2: Option<PathBuf>,
    pub metaphlan: Option<PathBuf>,
    pub humann_nucleotide: Option<PathBuf>,
    pub humann_protein: Option<PathBuf>,
    pub checkm: Option<PathBuf>,
    pub gtdbtk: Option<PathBuf>,
    pub amrfinder: Option<PathBuf>,
    /// CARD `card.json`, loaded by RGI.
    pub card_json: Option<PathBuf>,
    pub genomad: Option<PathBuf>,
    pub plasmidfinder: Option<PathBuf>,
}

/// Configuration keys of the databases, in the order they are written by `dbconfig`.
pub const DB_KEYS: [&str; 11] = [
    "HOST_INDEX", "KRAKEN2_DB", "METAPHLAN_DB", "HUMANN_NUC_DB", "HUMANN_PROT_DB", "CHECKM_DB",
    "GTDBTK_DATA_PATH", "AMRFINDER_DB", "CARD_JSON", "GENOMAD_DB", "PLASMIDFINDER_DB",
];

impl Databases {
    fn slot(&mut self, key: &str) -> Option<&mut Option<PathBuf>> {
        Some(match key {
            "HOST_INDEX" | "HOST_DB" => &mut self.host_index,
            "KRAKEN2_DB" | "KRAKEN_DB" => &mut self.kraken2,
            "METAPHLAN_DB" => &mut self.metaphlan,
            "HUMANN_NUC_DB" => &mut self.humann_nucleotide,
            "HUMANN_PROT_DB" => &mut self.humann_protein,
            "CHECKM_DB" | "CHECKM_DATA_PATH" => &mut self.checkm,
            "GTDBTK_DATA_PATH" | "GTDBTK_DB" => &mut self.gtdbtk,
            "AMRFINDER_DB" => &mut self.amrfinder,
            "CARD_JSON" | "CARD_DB" => &mut self.card_json,
            "GENOMAD_DB" => &mut self.genomad,
            "PLASMIDFINDER_DB" => &mut self.plasmidfinder,
            _ => return None,
        })
    }

    /// Sets the database by its configuration key. Empty value removes the database.
    /// Returns false if the key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        match self.slot(key) {
            Some(slot) => {
                *slot = if value.is_empty() { None } else { Some(PathBuf::from(value)) };
                true
            }
            None => false,
        }
    }

    /// Pairs `(key, path)` for all set databases.
    pub fn entries(&self) -> Vec<(&'static str, &Path)> {
        let slots = [
            &self.host_index, &self.kraken2, &self.metaphlan, &self.humann_nucleotide, &self.humann_protein,
            &self.checkm, &self.gtdbtk, &self.amrfinder, &self.card_json, &self.genomad, &self.plasmidfinder,
        ];
        DB_KEYS.iter().zip(slots)
            .filter_map(|(&key, slot)| slot.as_deref().map(|path| (key, path)))
            .collect()
    }
}

/// Checks that the database exists. Bowtie2 indices are given by their prefix.
pub fn database_exists(key: &str, path: &Path) -> bool {
    if key == "HOST_INDEX" {
        ["1.bt2", "1.bt2l"].iter().any(|suffix| ext::sys::append_path(path, format!(".{}", suffix)).exists())
            || path.exists()
    } else {
        path.exists()
    }
}

/// Parses lines `KEY=value`. Empty lines and `#` comments are ignored,
/// `export ` prefix and quotes around the value are removed.
pub fn parse_key_values(text: &str) -> Result<Vec<(String, String)>, String> {
    let mut res = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let (key, value) = line.split_once('=')
            .ok_or_else(|| format!("line {}: expected KEY=value, found {:?}", i + 1, line))?;
        let key = key.trim();
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(format!("line {}: invalid key {:?}", i + 1, key));
        }
        let mut value = value.trim();
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                value = &value[1..value.len() - 1];
            }
        }
        res.push((key.to_string(), value.to_string()));
    }
    Ok(res)
}

#[derive(Clone, Debug)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub threads: u16,
    /// Memory budget in gigabytes.
    pub memory_gb: u32,
    /// fastp: qualified quality phred.
    pub min_quality: u8,
    /// fastp: minimal read length after trimming.
    pub min_length: u32,
    pub min_contig_len: u32,
    pub bracken_read_len: u32,
    pub assembler: Assembler,
    pub abricate_dbs: Vec<String>,
    pub keep_tmp: bool,
    pub rerun: Rerun,
    pub databases: Databases,
    pub tools: Tools,
}

impl Config {
    /// Output directory of the step.
    pub fn step_dir(&self, step: StepKind) -> PathBuf {
        self.output_dir.join(step.dir_name())
    }

    /// Append-only log of a sample within a step.
    pub fn log_path(&self, step: StepKind, sample: &str) -> PathBuf {
        self.output_dir.join("logs").join(step.name()).join(format!("{}.log", sample))
    }

    /// Memory budget in bytes.
    pub fn memory_bytes(&self) -> u64 {
        u64::from(self.memory_gb) << 30
    }
}

/// Collects configuration entries in order: later entries override earlier ones.
pub struct ConfigBuilder {
    entries: Vec<(String, String, String)>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Loads all entries from a `KEY=value` file.
    pub fn load_file(&mut self, path: &Path) -> Result<&mut Self, Error> {
        let text = fs::read_to_string(path).map_err(add_path!(path))?;
        let pairs = parse_key_values(&text)
            .map_err(|e| Error::ParsingError(format!("{}: {}", ext::fmt::path(path), e)))?;
        log::debug!("Loaded {} configuration entries from {}", pairs.len(), ext::fmt::path(path));
        let origin = ext::fmt::path(path);
        for (key, value) in pairs {
            self.entries.push((key, value, origin.clone()));
        }
        Ok(self)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.push((key.into(), value.into(), "command line".to_string()));
        self
    }

    pub fn build(&self) -> Result<Config, Error> {
        let mut input_dir = None;
        let mut output_dir = None;
        let mut config = Config {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            threads: 8,
            memory_gb: 16,
            min_quality: 20,
            min_length: 50,
            min_contig_len: 1000,
            bracken_read_len: 150,
            assembler: Assembler::Megahit,
            abricate_dbs: vec!["card".to_string(), "vfdb".to_string(), "plasmidfinder".to_string()],
            keep_tmp: false,
            rerun: Rerun::None,
            databases: Databases::default(),
            tools: Tools::default(),
        };

        for (key, value, origin) in self.entries.iter() {
            let res: Result<(), String> = match key as &str {
                "INPUT_DIR" => { input_dir = Some(PathBuf::from(value)); Ok(()) }
                "OUTPUT_DIR" => { output_dir = Some(PathBuf::from(value)); Ok(()) }
                "THREADS" => parse_into(value, &mut config.threads),
                "MEMORY_GB" | "MEMORY" => parse_into(value, &mut config.memory_gb),
                "MIN_QUALITY" => parse_into(value, &mut config.min_quality),
                "MIN_LENGTH" => parse_into(value, &mut config.min_length),
                "MIN_CONTIG_LEN" => parse_into(value, &mut config.min_contig_len),
                "BRACKEN_READ_LEN" => parse_into(value, &mut config.bracken_read_len),
                "ASSEMBLER" => value.parse().map(|val| config.assembler = val),
                "RERUN" => value.parse().map(|val| config.rerun = val),
                "KEEP_TMP" => parse_bool(value).map(|val| config.keep_tmp = val),
                "ABRICATE_DBS" => {
                    config.abricate_dbs = value.split(',').map(str::trim).filter(|s| !s.is_empty())
                        .map(String::from).collect();
                    Ok(())
                }
                _ => {
                    if !config.databases.set(key, value)
                            && !(key.ends_with("_EXE") && config.tools.set_from_key(key, value)) {
                        log::warn!("Unknown configuration key {} ({})", key, origin);
                    }
                    Ok(())
                }
            };
            res.map_err(|e| Error::InvalidInput(format!("Cannot use {} = {:?} ({}): {}", key, value, origin, e)))?;
        }

        if config.databases.gtdbtk.is_none() {
            config.databases.gtdbtk = std::env::var_os("GTDBTK_DATA_PATH").map(PathBuf::from);
        }
        config.input_dir = input_dir
            .ok_or_else(|| Error::InvalidInput("Input directory is not provided (see -i/--input)".to_string()))?;
        config.output_dir = output_dir
            .ok_or_else(|| Error::InvalidInput("Output directory is not provided (see -o/--output)".to_string()))?;
        validate(&config)?;
        Ok(config)
    }
}

fn parse_into<T: FromStr>(value: &str, target: &mut T) -> Result<(), String>
where T::Err: fmt::Display,
{
    *target = value.parse().map_err(|e: T::Err| e.to_string())?;
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match &value.to_lowercase() as &str {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" | "" => Ok(false),
        _ => Err(format!("Cannot parse boolean {:?}", value)),
    }
}

fn validate(config: &Config) -> Result<(), Error> {
    validate_param!(config.input_dir.is_dir(), "Input directory {} does not exist",
        ext::fmt::path(&config.input_dir));
    validate_param!(!config.output_dir.is_file(), "Output path {} is a file",
        ext::fmt::path(&config.output_dir));
    validate_param!(config.threads > 0, "Number of threads must be positive");
    validate_param!(config.memory_gb > 0, "Memory budget must be positive");
    for (key, path) in config.databases.entries() {
        validate_param!(database_exists(key, path), "Database {} = {} does not exist", key, ext::fmt::path(path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values() {
        let text = "# databases\n\nexport KRAKEN2_DB=\"/db/kraken 2\"\nTHREADS = 4\nCARD_JSON='/db/card.json'\n";
        let pairs = parse_key_values(text).unwrap();
        assert_eq!(pairs, vec![
            ("KRAKEN2_DB".to_string(), "/db/kraken 2".to_string()),
            ("THREADS".to_string(), "4".to_string()),
            ("CARD_JSON".to_string(), "/db/card.json".to_string()),
        ]);
        assert!(parse_key_values("JUST_A_KEY\n").is_err());
        assert!(parse_key_values("BAD KEY=1\n").is_err());
    }

    #[test]
    fn later_entries_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(DB_CONFIG);
        fs::write(&file, "THREADS=4\nASSEMBLER=both\nMEMORY_GB=32\n").unwrap();
        let config = ConfigBuilder::new()
            .load_file(&file).unwrap()
            .set("INPUT_DIR", dir.path().to_str().unwrap())
            .set("OUTPUT_DIR", dir.path().join("out").to_str().unwrap())
            .set("THREADS", "2")
            .build().unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.memory_gb, 32);
        assert_eq!(config.assembler, Assembler::Both);
        assert_eq!(config.step_dir(StepKind::Qc), dir.path().join("out").join("01_qc"));
    }

    #[test]
    fn validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let base = || {
            let mut builder = ConfigBuilder::new();
            builder.set("INPUT_DIR", dir.path().to_str().unwrap()).set("OUTPUT_DIR", "out");
            builder
        };
        assert!(base().build().is_ok());
        assert!(matches!(base().set("THREADS", "0").build(), Err(Error::InvalidInput(_))));
        assert!(matches!(base().set("THREADS", "many").build(), Err(Error::InvalidInput(_))));
        assert!(matches!(base().set("KRAKEN2_DB", "/nonexistent/kraken").build(), Err(Error::InvalidInput(_))));
        assert!(matches!(ConfigBuilder::new().set("OUTPUT_DIR", "out").build(), Err(Error::InvalidInput(_))));

        let index = dir.path().join("human");
        fs::write(ext::sys::append_path(&index, ".1.bt2"), "").unwrap();
        let config = base().set("HOST_INDEX", index.to_str().unwrap()).build().unwrap();
        assert_eq!(config.databases.host_index.as_deref(), Some(index.as_path()));
    }
}
