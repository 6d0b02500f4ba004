/**
 * IDENTITY MATCHER - Rapprochement des visages captés avec le roster connu
 *
 * RÔLE : Adapter l'index de similarité brut (plus proche voisin + distance)
 * en décision d'identité. En-dessous du seuil on nomme quelqu'un, sinon rien.
 *
 * FONCTIONNEMENT : Index plat en mémoire construit au démarrage depuis le
 * store, distance L2 au carré. Le seuil de référence 500 s'exprime dans ces
 * unités et l'acceptation est strictement sous le seuil.
 */

use std::sync::Arc;

pub trait SimilarityIndex: Send + Sync {
    /// Ligne indexée la plus proche du vecteur requête : (distance, numéro de ligne).
    /// None si l'index est vide ou si la dimension ne correspond pas.
    fn nearest(&self, query: &[f32]) -> Option<(f32, usize)>;
}

/// Scan linéaire exact sur un instantané d'encodages.
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize, vectors: Vec<Vec<f32>>) -> Self {
        Self { dim, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl SimilarityIndex for FlatIndex {
    fn nearest(&self, query: &[f32]) -> Option<(f32, usize)> {
        if query.len() != self.dim {
            return None;
        }
        let mut best: Option<(f32, usize)> = None;
        for (row, vector) in self.vectors.iter().enumerate() {
            let d = squared_l2(query, vector);
            if best.map_or(true, |(b, _)| d < b) {
                best = Some((d, row));
            }
        }
        best
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMatch {
    pub identity: String,
    pub distance: f32,
}

pub struct IdentityMatcher {
    index: Arc<dyn SimilarityIndex>,
    identities: Vec<String>,
    threshold: f32,
}

impl IdentityMatcher {
    pub fn new(index: Arc<dyn SimilarityIndex>, identities: Vec<String>, threshold: f32) -> Self {
        Self { index, identities, threshold }
    }

    /// Construit l'index plat depuis l'instantané (identité, encodage) du store.
    /// Les encodages de dimension incohérente sont écartés pour garder la table
    /// des identités alignée sur les lignes de l'index.
    pub fn from_encodings(encodings: Vec<(String, Vec<f32>)>, threshold: f32) -> Self {
        let dim = encodings.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut identities = Vec::with_capacity(encodings.len());
        let mut vectors = Vec::with_capacity(encodings.len());
        for (identity, vector) in encodings {
            if vector.len() != dim {
                eprintln!(
                    "[matcher] skipping encoding for {identity}: dim {} (expected {dim})",
                    vector.len()
                );
                continue;
            }
            identities.push(identity);
            vectors.push(vector);
        }
        Self::new(Arc::new(FlatIndex::new(dim, vectors)), identities, threshold)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Identité reconnue pour un embedding, si la distance passe strictement
    /// sous le seuil. Un non-match est un résultat normal, pas une erreur.
    pub async fn identify(&self, embedding: &[f32]) -> Option<IdentityMatch> {
        let (distance, row) = self.index.nearest(embedding)?;
        if distance < self.threshold {
            let identity = self.identities.get(row)?.clone();
            Some(IdentityMatch { identity, distance })
        } else {
            None
        }
    }
}
