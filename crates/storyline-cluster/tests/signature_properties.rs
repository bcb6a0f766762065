//! Property checks for signatures and the LSH index over generated text.
//!
//! Texts are drawn from a fixed-seed RNG so failures reproduce.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use storyline_cluster::normalize::normalize;
use storyline_cluster::tfidf::tokenize;
use storyline_cluster::{CorpusStats, LshIndex, MinHash, TfIdfVector};

const WORDS: &[&str] = &[
    "council", "budget", "transit", "storm", "flood", "river", "market", "shares", "election",
    "governor", "village", "harbor", "minister", "strike", "union", "vaccine", "court", "ruling",
    "bridge", "airport", "festival", "drought", "wildfire", "summit",
];

fn random_text(rng: &mut StdRng, words: usize) -> String {
    (0..words)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn minhash(text: &str) -> MinHash {
    MinHash::from_text(&normalize(text), 5, 128)
}

#[test]
fn self_similarity_is_one() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let len = rng.gen_range(2..40);
        let h = minhash(&random_text(&mut rng, len));
        assert_eq!(h.similarity(&h), 1.0);
    }
}

#[test]
fn signature_roundtrip_is_exact() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..50 {
        let len = rng.gen_range(2..40);
        let h = minhash(&random_text(&mut rng, len));
        let signature = h.signature();
        let parsed = MinHash::from_signature(&signature).unwrap();

        assert_eq!(parsed.signature(), signature);
        assert_eq!(parsed.similarity(&parsed), 1.0);
        assert_eq!(parsed.similarity(&h), 1.0);
    }
}

#[test]
fn similarity_is_symmetric() {
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..50 {
        let a = minhash(&random_text(&mut rng, 20));
        let b = minhash(&random_text(&mut rng, 20));
        assert_eq!(a.similarity(&b), b.similarity(&a));
    }
}

#[test]
fn empty_tfidf_signatures_have_zero_cosine() {
    let a = TfIdfVector::from_signature("").unwrap();
    let b = TfIdfVector::from_signature("").unwrap();
    assert_eq!(a.cosine_similarity(&b), 0.0);
}

#[test]
fn index_add_then_remove() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut index = LshIndex::new(128, 16).unwrap();
    let signatures: Vec<(u32, MinHash)> = (0..40)
        .map(|id| (id, minhash(&random_text(&mut rng, 15))))
        .collect();

    for (id, h) in &signatures {
        index.add(*id, h).unwrap();
        assert!(index.candidates(h).unwrap().contains(id));
    }
    for (id, h) in &signatures {
        index.remove(*id, h).unwrap();
        assert!(!index.candidates(h).unwrap().contains(id));
    }
    assert!(index.is_empty());
    assert_eq!(index.bucket_count(), 0);
}

#[test]
fn paraphrases_score_above_unrelated_text() {
    let original = "Senate passes healthcare bill expanding coverage to millions of \
        uninsured Americans after a marathon overnight session.";
    let paraphrase = "Senate passes health care bill, expanding coverage to millions of \
        uninsured Americans after marathon overnight session.";
    let unrelated = "Local bakery wins regional award for its sourdough bread and \
        plans to open a second shop downtown next year.";

    let (h1, h2, h3) = (minhash(original), minhash(paraphrase), minhash(unrelated));
    assert!(h1.similarity(&h2) > h1.similarity(&h3));

    let docs: Vec<Vec<String>> = [original, paraphrase, unrelated]
        .iter()
        .map(|t| tokenize(&normalize(t)))
        .collect();
    let mut corpus = CorpusStats::new();
    for doc in &docs {
        corpus.add_document(doc);
    }
    let vectors: Vec<TfIdfVector> = docs
        .iter()
        .map(|doc| TfIdfVector::from_tokens(doc, &corpus))
        .collect();

    assert!(vectors[0].cosine_similarity(&vectors[1]) > vectors[0].cosine_similarity(&vectors[2]));
}
