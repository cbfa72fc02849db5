use rand::Rng;
use rand_distr::Zipf;

/// Wraps a Zipfian distribution for generating key IDs.
pub struct ZipfianGenerator {
    dist: Zipf<f64>,
}

impl ZipfianGenerator {
    pub fn new(num_keys: u64, alpha: f64) -> Self {
        let dist = Zipf::new(num_keys, alpha).expect("invalid Zipfian parameters");
        Self { dist }
    }

    /// Generate the next key ID (1-based).
    pub fn next_id(&mut self) -> u64 {
        let mut rng = rand::thread_rng();
        rng.sample(&self.dist) as u64
    }
}
