//! Article fingerprints: normalized text, MinHash and TF-IDF together.

use storyline_core::{Article, Signatures};
use storyline_store::WriteOp;

use crate::config::ClusteringConfig;
use crate::error::SignatureError;
use crate::minhash::MinHash;
use crate::normalize::SignatureText;
use crate::tfidf::{CorpusStats, TfIdfVector, tokenize};

/// Normalized text and tokens of an article, ready for signing.
#[derive(Debug, Clone)]
pub struct ArticleText {
    pub text: SignatureText,
    pub tokens: Vec<String>,
}

impl ArticleText {
    /// Normalizes the title and lead of `article`.
    pub fn of(article: &Article, config: &ClusteringConfig) -> Self {
        let text =
            SignatureText::from_article(&article.title, &article.content, config.lead_max_chars);
        let tokens = tokenize(&text.combined());
        Self { text, tokens }
    }

    /// Computes fresh signatures against the current corpus.
    pub fn sign(&self, config: &ClusteringConfig, corpus: &CorpusStats) -> Fingerprint {
        Fingerprint {
            minhash: MinHash::from_text(&self.text.combined(), config.ngram_size, config.num_hashes),
            tfidf: TfIdfVector::from_tokens(&self.tokens, corpus),
        }
    }

    /// Computes signatures for text not yet counted in `corpus`.
    pub fn sign_unobserved(&self, config: &ClusteringConfig, corpus: &CorpusStats) -> Fingerprint {
        Fingerprint {
            minhash: MinHash::from_text(&self.text.combined(), config.ngram_size, config.num_hashes),
            tfidf: TfIdfVector::from_unobserved_tokens(&self.tokens, corpus),
        }
    }

    /// The write that persists `fingerprint` next to this text.
    pub fn persist(&self, article: &Article, fingerprint: &Fingerprint) -> WriteOp {
        WriteOp::SetSignatures {
            article_id: article.id,
            signatures: fingerprint.to_signatures(),
            normalized_title: self.text.normalized_title.clone(),
            normalized_lead: self.text.normalized_lead.clone(),
        }
    }
}

/// Parsed similarity signatures of one article.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub minhash: MinHash,
    pub tfidf: TfIdfVector,
}

impl Fingerprint {
    /// Parses the persisted signatures of `article`.
    ///
    /// Returns `Ok(None)` when the article was never signed. A MinHash with
    /// the wrong number of slots counts as corrupt.
    pub fn parse(
        article: &Article,
        config: &ClusteringConfig,
    ) -> Result<Option<Self>, SignatureError> {
        let Some(signatures) = &article.signatures else {
            return Ok(None);
        };
        if signatures.minhash.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            minhash: MinHash::from_signature_checked(&signatures.minhash, config.num_hashes)?,
            tfidf: TfIdfVector::from_signature(&signatures.tfidf)?,
        }))
    }

    /// Serialized form for storage.
    pub fn to_signatures(&self) -> Signatures {
        Signatures {
            minhash: self.minhash.signature(),
            tfidf: self.tfidf.signature(),
        }
    }
}
