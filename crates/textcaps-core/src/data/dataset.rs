//! # Dataset loading
//!
//! Reads a raw text classification corpus from disk, builds the vocabulary and
//! label table, and encodes both splits into token-id examples truncated to a
//! maximum length. The encoded result is cached next to the raw files.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::tokenizer::Tokenizer;
use super::vocab::{UNK_ID, Vocab, VocabOptions};
use crate::error::{Result, TextCapsError};

/// Supported text classification corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Imdb,
    Newsgroups,
    Reuters,
    Webkb,
    Cade,
    Dbpedia,
    Agnews,
    Yahoo,
    Sogou,
    Yelp,
    Amazon,
}

impl DataType {
    pub const ALL: [DataType; 11] = [
        DataType::Imdb,
        DataType::Newsgroups,
        DataType::Reuters,
        DataType::Webkb,
        DataType::Cade,
        DataType::Dbpedia,
        DataType::Agnews,
        DataType::Yahoo,
        DataType::Sogou,
        DataType::Yelp,
        DataType::Amazon,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Imdb => "imdb",
            DataType::Newsgroups => "newsgroups",
            DataType::Reuters => "reuters",
            DataType::Webkb => "webkb",
            DataType::Cade => "cade",
            DataType::Dbpedia => "dbpedia",
            DataType::Agnews => "agnews",
            DataType::Yahoo => "yahoo",
            DataType::Sogou => "sogou",
            DataType::Yelp => "yelp",
            DataType::Amazon => "amazon",
        }
    }

    /// Whether this corpus ships a fine-grained label set.
    pub fn supports_fine_grained(self) -> bool {
        matches!(self, DataType::Reuters | DataType::Yelp | DataType::Amazon)
    }

    /// Name used for checkpoints and plot environments.
    pub fn run_name(self, fine_grained: bool) -> String {
        if fine_grained && self.supports_fine_grained() {
            format!("{}_fine_grained", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = TextCapsError;

    fn from_str(s: &str) -> Result<Self> {
        DataType::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| TextCapsError::UnknownDataType(s.to_string()))
    }
}

/// Options controlling how a corpus is loaded and encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOptions {
    pub data_type: DataType,
    /// Use the fine-grained label set where available.
    pub fine_grained: bool,
    /// Maximum number of tokens kept per document.
    pub text_length: usize,
    /// Directory holding one sub-directory per corpus.
    pub data_dir: PathBuf,
    pub vocab: VocabOptions,
    /// Ignore and overwrite an existing cache.
    #[serde(default)]
    pub rebuild_cache: bool,
}

impl DataOptions {
    pub fn new(data_type: DataType, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_type,
            fine_grained: false,
            text_length: 2700,
            data_dir: data_dir.into(),
            vocab: VocabOptions::default(),
            rebuild_cache: false,
        }
    }

    /// Whether fine-grained labels are actually in effect.
    pub fn effective_fine_grained(&self) -> bool {
        self.fine_grained && self.data_type.supports_fine_grained()
    }

    pub fn run_name(&self) -> String {
        self.data_type.run_name(self.fine_grained)
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.data_dir.join(self.data_type.as_str())
    }

    /// Cache file keyed by every option that changes the encoded result.
    pub fn cache_path(&self) -> PathBuf {
        let mut name = format!(
            "{}_len{}_min{}",
            self.run_name(),
            self.text_length,
            self.vocab.min_freq
        );
        if let Some(max) = self.vocab.max_size {
            name.push_str(&format!("_max{max}"));
        }
        self.corpus_dir().join("cache").join(format!("{name}.json"))
    }

}

/// One encoded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub tokens: Vec<u32>,
    pub label: u32,
}

impl Example {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Encoded corpus ready for batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedData {
    pub vocab: Vocab,
    /// Label names in id order.
    pub labels: Vec<String>,
    pub train: Vec<Example>,
    pub test: Vec<Example>,
}

impl LoadedData {
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn num_class(&self) -> usize {
        self.labels.len()
    }
}

/// A label as it appears in the raw files.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Text(String),
    Number(i64),
}

impl RawLabel {
    fn into_string(self) -> String {
        match self {
            RawLabel::Text(s) => s,
            RawLabel::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    text: String,
    label: RawLabel,
    #[serde(default)]
    fine_label: Option<RawLabel>,
}

/// A raw document with its resolved label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub text: String,
    pub label: String,
}

/// Load a corpus, using the on-disk cache when present.
pub fn load_data(options: &DataOptions) -> Result<LoadedData> {
    if options.text_length == 0 {
        return Err(TextCapsError::InvalidConfig(
            "text_length must be at least 1".into(),
        ));
    }

    let cache = options.cache_path();
    if !options.rebuild_cache && cache.exists() {
        info!(path = %cache.display(), "Loading cached dataset");
        let reader = BufReader::new(File::open(&cache)?);
        return Ok(serde_json::from_reader(reader)?);
    }

    let dir = options.corpus_dir();
    let fine = options.effective_fine_grained();
    let train = read_split(&dir, "train", fine)?;
    let test = read_split(&dir, "test", fine)?;
    info!(
        data_type = %options.data_type,
        train = train.len(),
        test = test.len(),
        "Read raw dataset"
    );

    let data = preprocess(&train, &test, options)?;

    write_cache(&cache, &data)?;
    debug!(path = %cache.display(), "Wrote dataset cache");

    Ok(data)
}

/// Write through a temporary file so a failed write never leaves a
/// truncated cache behind.
fn write_cache(path: &Path, data: &LoadedData) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = write_json(&tmp, data) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_json(path: &Path, data: &LoadedData) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}

/// Tokenize, build vocabulary and labels, and encode both splits.
pub fn preprocess(
    train: &[RawDocument],
    test: &[RawDocument],
    options: &DataOptions,
) -> Result<LoadedData> {
    if train.is_empty() {
        return Err(TextCapsError::EmptyDataset {
            split: "train".into(),
        });
    }
    if test.is_empty() {
        return Err(TextCapsError::EmptyDataset {
            split: "test".into(),
        });
    }

    let tokenizer = Tokenizer::new()?;
    let max_len = options.text_length;
    let train_tokens: Vec<Vec<String>> = train
        .iter()
        .map(|d| tokenizer.tokenize_truncated(&d.text, max_len))
        .collect();
    let test_tokens: Vec<Vec<String>> = test
        .iter()
        .map(|d| tokenizer.tokenize_truncated(&d.text, max_len))
        .collect();

    let vocab = Vocab::build(&train_tokens, options.vocab);
    let labels = label_table(train.iter().chain(test.iter()).map(|d| d.label.as_str()));

    let encode = |docs: &[RawDocument], tokens: &[Vec<String>]| -> Vec<Example> {
        docs.iter()
            .zip(tokens)
            .map(|(doc, toks)| {
                let mut ids = vocab.encode(toks);
                if ids.is_empty() {
                    ids.push(UNK_ID);
                }
                let label = labels
                    .iter()
                    .position(|l| *l == doc.label)
                    .map(|p| p as u32)
                    .unwrap_or_default();
                Example { tokens: ids, label }
            })
            .collect()
    };

    let train = encode(train, &train_tokens);
    let test = encode(test, &test_tokens);

    Ok(LoadedData {
        vocab,
        labels,
        train,
        test,
    })
}

/// Contiguous label ids: numeric order when every label is an integer,
/// lexical order otherwise.
fn label_table<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    let unique: BTreeSet<&str> = labels.collect();
    let table: Vec<String> = unique.into_iter().map(str::to_string).collect();
    let numeric: Option<Vec<i64>> = table.iter().map(|l| l.parse().ok()).collect();
    match numeric {
        Some(numbers) => {
            let mut keyed: Vec<(i64, String)> = numbers.into_iter().zip(table).collect();
            keyed.sort_by_key(|(n, _)| *n);
            keyed.into_iter().map(|(_, l)| l).collect()
        }
        None => table,
    }
}

/// Locate `<split>.jsonl` or `<split>.jsonl.gz` inside a corpus directory.
fn split_path(dir: &Path, split: &str) -> Result<PathBuf> {
    let plain = dir.join(format!("{split}.jsonl"));
    if plain.exists() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{split}.jsonl.gz"));
    if gz.exists() {
        return Ok(gz);
    }
    Err(TextCapsError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no {split}.jsonl[.gz] in {}", dir.display()),
    )))
}

/// Read one split of raw JSON-lines records.
pub fn read_split(dir: &Path, split: &str, fine_grained: bool) -> Result<Vec<RawDocument>> {
    let path = split_path(dir, split)?;
    let file = File::open(&path)?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    read_records(BufReader::new(reader), &path, fine_grained)
}

fn read_records<R: BufRead>(
    reader: R,
    path: &Path,
    fine_grained: bool,
) -> Result<Vec<RawDocument>> {
    let mut docs = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: RawRecord =
            serde_json::from_str(line).map_err(|e| TextCapsError::MalformedRecord {
                path: path.to_path_buf(),
                line: idx + 1,
                reason: e.to_string(),
            })?;

        let label = match (fine_grained, record.fine_label) {
            (true, Some(fine)) => fine,
            _ => record.label,
        };
        docs.push(RawDocument {
            text: record.text,
            label: label.into_string(),
        });
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn doc(text: &str, label: &str) -> RawDocument {
        RawDocument {
            text: text.into(),
            label: label.into(),
        }
    }

    fn options(dir: &Path, text_length: usize) -> DataOptions {
        DataOptions {
            text_length,
            ..DataOptions::new(DataType::Imdb, dir)
        }
    }

    #[test]
    fn test_data_type_parsing() {
        assert_eq!("yelp".parse::<DataType>().unwrap(), DataType::Yelp);
        assert!("mnist".parse::<DataType>().is_err());
        for d in DataType::ALL {
            assert_eq!(d.as_str().parse::<DataType>().unwrap(), d);
        }
    }

    #[test]
    fn test_run_name_fine_grained_only_where_supported() {
        assert_eq!(DataType::Yelp.run_name(true), "yelp_fine_grained");
        assert_eq!(DataType::Reuters.run_name(true), "reuters_fine_grained");
        assert_eq!(DataType::Imdb.run_name(true), "imdb");
        assert_eq!(DataType::Amazon.run_name(false), "amazon");
    }

    #[test]
    fn test_preprocess_truncates_every_example() {
        let dir = tempfile::tempdir().unwrap();
        let train = vec![
            doc("a b c d e f g h", "pos"),
            doc("a b", "neg"),
            doc("", "neg"),
        ];
        let test = vec![doc("h g f e d c b a z z z", "pos")];
        let data = preprocess(&train, &test, &options(dir.path(), 4)).unwrap();

        for ex in data.train.iter().chain(&data.test) {
            assert!(!ex.is_empty());
            assert!(ex.len() <= 4);
        }
        assert_eq!(data.train[2].tokens, vec![UNK_ID]);
    }

    #[test]
    fn test_preprocess_labels_are_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let train = vec![doc("x", "sports"), doc("y", "business")];
        let test = vec![doc("z", "world")];
        let data = preprocess(&train, &test, &options(dir.path(), 10)).unwrap();

        assert_eq!(data.labels, vec!["business", "sports", "world"]);
        assert_eq!(data.num_class(), 3);
        assert_eq!(data.train[0].label, 1);
        assert_eq!(data.test[0].label, 2);
    }

    #[test]
    fn test_numeric_labels_sort_numerically() {
        let table = label_table(["10", "2", "1"].into_iter());
        assert_eq!(table, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_test_split_uses_train_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let train = vec![doc("good film", "1")];
        let test = vec![doc("unseen film", "0")];
        let data = preprocess(&train, &test, &options(dir.path(), 10)).unwrap();

        assert_eq!(data.test[0].tokens[0], UNK_ID);
        assert_eq!(data.test[0].tokens[1], data.vocab.id("film"));
    }

    #[test]
    fn test_preprocess_rejects_empty_split() {
        let dir = tempfile::tempdir().unwrap();
        let err = preprocess(&[], &[doc("a", "b")], &options(dir.path(), 10)).unwrap_err();
        assert!(matches!(err, TextCapsError::EmptyDataset { .. }));
    }

    fn write_corpus(root: &Path, data_type: DataType) {
        let dir = root.join(data_type.as_str());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("train.jsonl"),
            concat!(
                r#"{"text": "great movie", "label": "pos", "fine_label": 5}"#,
                "\n\n",
                r#"{"text": "awful movie", "label": "neg", "fine_label": 1}"#,
                "\n",
            ),
        )
        .unwrap();

        let mut gz = GzEncoder::new(
            File::create(dir.join("test.jsonl.gz")).unwrap(),
            Compression::default(),
        );
        writeln!(gz, r#"{{"text": "great", "label": "pos", "fine_label": 4}}"#).unwrap();
        gz.finish().unwrap();
    }

    #[test]
    fn test_load_data_reads_plain_and_gzip_and_caches() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(root.path(), DataType::Imdb);

        let opts = options(root.path(), 50);
        let data = load_data(&opts).unwrap();
        assert_eq!(data.train.len(), 2);
        assert_eq!(data.test.len(), 1);
        assert_eq!(data.labels, vec!["neg", "pos"]);
        assert!(opts.cache_path().exists());

        // A second load must come from the cache even without raw files.
        fs::remove_file(opts.corpus_dir().join("train.jsonl")).unwrap();
        let cached = load_data(&opts).unwrap();
        assert_eq!(cached.train, data.train);
        assert_eq!(cached.vocab, data.vocab);
    }

    #[test]
    fn test_vocab_options_select_their_own_cache() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(root.path(), DataType::Imdb);

        let all = options(root.path(), 50);
        let data = load_data(&all).unwrap();
        assert_ne!(data.vocab.id("great"), UNK_ID);

        let frequent = DataOptions {
            vocab: VocabOptions {
                min_freq: 2,
                max_size: None,
            },
            ..options(root.path(), 50)
        };
        assert_ne!(frequent.cache_path(), all.cache_path());
        let data = load_data(&frequent).unwrap();
        assert_eq!(data.vocab.id("great"), UNK_ID);
        assert_ne!(data.vocab.id("movie"), UNK_ID);

        let capped = DataOptions {
            vocab: VocabOptions {
                min_freq: 1,
                max_size: Some(3),
            },
            ..options(root.path(), 50)
        };
        assert!(capped.cache_path().ends_with("cache/imdb_len50_min1_max3.json"));
        assert_eq!(load_data(&capped).unwrap().vocab.len(), 3);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_cache_write_is_reported() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(root.path(), DataType::Imdb);
        let opts = options(root.path(), 50);
        let cache = opts.cache_path();
        fs::create_dir_all(cache.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink("/dev/full", cache.with_extension("json.tmp")).unwrap();

        assert!(load_data(&opts).is_err());
        assert!(!cache.exists());
    }

    #[test]
    fn test_load_data_fine_grained() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(root.path(), DataType::Yelp);

        let opts = DataOptions {
            fine_grained: true,
            ..options(root.path(), 50)
        };
        let opts = DataOptions {
            data_type: DataType::Yelp,
            ..opts
        };
        let data = load_data(&opts).unwrap();
        assert_eq!(data.labels, vec!["1", "4", "5"]);
        assert!(opts.cache_path().ends_with("cache/yelp_fine_grained_len50_min1.json"));
    }

    #[test]
    fn test_malformed_record_reports_line() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("imdb");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("train.jsonl"), "{\"text\": \"ok\", \"label\": 1}\n{oops}\n").unwrap();

        let err = read_split(&dir, "train", false).unwrap_err();
        match err {
            TextCapsError::MalformedRecord { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
