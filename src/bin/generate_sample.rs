use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use socialed_data::data::npy;
use socialed_data::{LoaderConfig, REQUIRED_COLUMNS};

/// Write a synthetic `<name>.npy` with the eleven tweet columns, for trying
/// the loader without network access.
#[derive(Parser)]
struct Args {
    /// Dataset name; the file is written as `<out_dir>/<name>/<name>.npy`
    #[arg(default_value = "Event2012_100")]
    name: String,

    /// Number of tweets
    #[arg(long, default_value_t = 200)]
    rows: usize,

    /// Number of distinct events
    #[arg(long, default_value_t = 5)]
    events: usize,

    /// Data root to write into (defaults to the loader's data root)
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n.max(1) as u64) as usize
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[self.below(items.len())]
    }
}

const EVENT_VOCAB: &[&[&str]] = &[
    &["earthquake", "magnitude", "shaking", "aftershock", "rescue"],
    &["flood", "water", "evacuation", "rain", "river"],
    &["election", "vote", "ballot", "candidate", "polls"],
    &["wildfire", "smoke", "firefighters", "evacuate", "acres"],
    &["hurricane", "landfall", "winds", "storm", "surge"],
];
const FILLER: &[&str] = &["the", "just", "now", "breaking", "update", "please", "stay"];
const PLACES: &[&str] = &["Chile", "Houston", "Nepal", "Paris", "Manila"];

/// Python-style list literal, which is how list cells print in the source data.
fn py_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{s}'")).collect();
    format!("[{}]", quoted.join(", "))
}

fn tweet_row(rng: &mut SimpleRng, i: usize, n_events: usize) -> Vec<String> {
    let event = rng.below(n_events);
    let vocab = EVENT_VOCAB[event % EVENT_VOCAB.len()];
    let place = rng.pick(PLACES);

    let words: Vec<String> = (0..6)
        .map(|k| {
            if k % 3 == 0 {
                rng.pick(FILLER).to_string()
            } else {
                rng.pick(vocab).to_string()
            }
        })
        .collect();
    let filtered: Vec<String> = words
        .iter()
        .filter(|w| !FILLER.contains(&w.as_str()))
        .cloned()
        .collect();
    let hashtag = rng.pick(vocab).to_string();
    let mention = format!("user{}", rng.below(50));
    let text = format!("{} in {place} #{hashtag} @{mention}", words.join(" "));

    let row = vec![
        format!("{}", 250_000_000_000_000_000u64 + i as u64),
        text,
        event.to_string(),
        py_list(&words),
        py_list(&filtered),
        py_list(&[place.to_string()]),
        (10_000 + rng.below(5_000)).to_string(),
        format!(
            "2012-10-{:02}T{:02}:{:02}:00",
            1 + rng.below(28),
            rng.below(24),
            rng.below(60)
        ),
        py_list(&[]),
        py_list(&[hashtag]),
        py_list(&[mention]),
    ];
    debug_assert_eq!(row.len(), REQUIRED_COLUMNS.len());
    row
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(42);

    let rows: Vec<Vec<String>> = (0..args.rows)
        .map(|i| tweet_row(&mut rng, i, args.events))
        .collect();

    let out_dir = match args.out_dir {
        Some(dir) => dir,
        None => LoaderConfig::from_env().context("reading loader configuration")?.data_root,
    };
    let dir = out_dir.join(&args.name);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.npy", args.name));
    npy::write_unicode_file(&path, &rows).with_context(|| format!("writing {}", path.display()))?;

    println!(
        "Wrote {} tweets across {} events to {}",
        rows.len(),
        args.events,
        path.display()
    );
    Ok(())
}
