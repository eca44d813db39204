//! `Image` and `Architecture` (SPEC_FULL.md §3). Deduplicated by
//! `pull_specification`; creation is an upsert (invariant 6).

use iib_id::ImageId;

#[derive(Debug, Clone)]
pub struct Image {
    pub id: ImageId,
    pub pull_specification: String,
    pub architectures: Vec<String>,
}
