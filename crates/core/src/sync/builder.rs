//! Batch builder: contiguous, bounded submission slices

use stagesync_domain::StagedRecord;

/// Splits pending records into submission slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBuilder {
    target_size: usize,
}

impl BatchBuilder {
    /// A target size of zero is treated as one.
    pub fn new(target_size: usize) -> Self {
        Self { target_size: target_size.max(1) }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Partition `records` in their original order into contiguous slices of
    /// at most `target_size`. An empty input yields no slices.
    pub fn build(&self, records: Vec<StagedRecord>) -> Vec<Vec<StagedRecord>> {
        if records.is_empty() {
            return Vec::new();
        }

        let mut slices = Vec::with_capacity(records.len().div_ceil(self.target_size));
        let mut current = Vec::with_capacity(self.target_size.min(records.len()));
        for record in records {
            current.push(record);
            if current.len() == self.target_size {
                slices.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            slices.push(current);
        }
        slices
    }
}
