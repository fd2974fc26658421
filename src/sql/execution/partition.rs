use crate::common::Result;
use crate::errinput;
use crate::sql::execution::budget::PageBudget;
use crate::sql::execution::operator::Operator;
use crate::storage::page::Batch;
use crate::storage::spill::{PageWriter, SpillArena, SpillId};
use crate::storage::tuple::Row;
use crate::types::field::Field;
use dyn_clone::DynClone;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};

/// A hash function over join key values.
///
/// The hash join uses two of these with different jobs: one decides which
/// disk bucket a key lands in, the other keys the in-memory table built for a
/// bucket. Both only have to agree for equal keys; collisions are resolved by
/// comparing the actual values.
pub trait KeyHasher: DynClone + Debug {
    fn hash(&self, key: &Field) -> u64;

    /// The bucket in `0..buckets` that `key` belongs to.
    fn bucket(&self, key: &Field, buckets: usize) -> usize {
        (self.hash(key) % buckets as u64) as usize
    }
}

dyn_clone::clone_trait_object!(KeyHasher);

/// The default partitioning hash: integer keys go to bucket
/// `value mod buckets` (Euclidean, so negative keys too), every other key is
/// hashed with djb2 over its text form.
#[derive(Clone, Copy, Debug, Default)]
pub struct PartitionHasher;

impl KeyHasher for PartitionHasher {
    fn hash(&self, key: &Field) -> u64 {
        match key {
            Field::Integer(i) => *i as u32 as u64,
            other => djb2(other.as_key_text().as_bytes()),
        }
    }

    fn bucket(&self, key: &Field, buckets: usize) -> usize {
        match key {
            Field::Integer(i) => i64::from(*i).rem_euclid(buckets as i64) as usize,
            other => (self.hash(other) % buckets as u64) as usize,
        }
    }
}

fn djb2(bytes: &[u8]) -> u64 {
    bytes.iter().fold(5381u64, |hash, &b| {
        hash.wrapping_mul(33).wrapping_add(u64::from(b))
    })
}

/// The default probe hash, independent of [`PartitionHasher`]: SipHash over
/// the value's `Hash` impl.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProbeHasher;

impl KeyHasher for ProbeHasher {
    fn hash(&self, key: &Field) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// Splits a relation into disk buckets by hashing one attribute, in a single
/// pass.
///
/// Holds one accumulator page per bucket plus the input page being
/// distributed, so it needs `bucket_count + 1` pages of budget. A bucket's
/// file is only created once the bucket receives its first tuple; buckets
/// that stay empty come back as None. Within a bucket, tuples keep their
/// input order.
#[derive(Clone, Debug)]
pub struct DiskPartitioner {
    bucket_count: usize,
    key_index: usize,
    hasher: Box<dyn KeyHasher>,
}

impl DiskPartitioner {
    pub fn new(bucket_count: usize, key_index: usize, hasher: Box<dyn KeyHasher>) -> Result<Self> {
        if bucket_count == 0 {
            return errinput!("cannot partition into zero buckets");
        }
        Ok(Self {
            bucket_count,
            key_index,
            hasher,
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// The bucket a row belongs to.
    pub fn bucket_of(&self, row: &Row) -> Result<usize> {
        let key = row.get_field(self.key_index)?;
        Ok(self.hasher.bucket(key, self.bucket_count))
    }

    /// Drains the already opened `input` into bucket files created in
    /// `arena`, named `{prefix}-{bucket}-...`. Bucket pages hold
    /// `page_capacity` tuples.
    ///
    /// On failure the files created so far stay in the arena; the owning
    /// operator deletes them when it is closed.
    pub fn partition(
        &self,
        input: &mut dyn Operator,
        page_capacity: usize,
        arena: &mut SpillArena,
        budget: &mut PageBudget,
        prefix: &str,
    ) -> Result<Vec<Option<SpillId>>> {
        let pages = self.bucket_count + 1;
        budget.reserve(pages)?;
        let result = self.distribute(input, page_capacity, arena, prefix);
        budget.release(pages);

        let buckets = result?;
        log::debug!(
            "partitioned {} into {} buckets ({} non-empty)",
            prefix,
            self.bucket_count,
            buckets.iter().flatten().count()
        );
        Ok(buckets)
    }

    fn distribute(
        &self,
        input: &mut dyn Operator,
        page_capacity: usize,
        arena: &mut SpillArena,
        prefix: &str,
    ) -> Result<Vec<Option<SpillId>>> {
        let mut buckets: Vec<Option<(SpillId, PageWriter)>> =
            (0..self.bucket_count).map(|_| None).collect();
        let mut accumulators: Vec<Batch> = (0..self.bucket_count)
            .map(|_| Batch::new(page_capacity))
            .collect();

        while let Some(page) = input.next()? {
            for row in page {
                let bucket = self.bucket_of(&row)?;
                let accumulator = &mut accumulators[bucket];
                if accumulator.is_full() {
                    let full = std::mem::replace(accumulator, Batch::new(page_capacity));
                    Self::flush(&mut buckets[bucket], &full, arena, prefix, bucket)?;
                }
                accumulators[bucket].push(row)?;
            }
        }

        let mut ids = Vec::with_capacity(self.bucket_count);
        for (bucket, (accumulator, writer)) in accumulators.iter().zip(&mut buckets).enumerate() {
            if !accumulator.is_empty() {
                Self::flush(writer, accumulator, arena, prefix, bucket)?;
            }
            ids.push(match writer.take() {
                Some((id, writer)) => {
                    let pages = writer.finish()?;
                    log::trace!("bucket {bucket} of {prefix}: {pages} pages");
                    Some(id)
                }
                None => None,
            });
        }
        Ok(ids)
    }

    fn flush(
        writer: &mut Option<(SpillId, PageWriter)>,
        page: &Batch,
        arena: &mut SpillArena,
        prefix: &str,
        bucket: usize,
    ) -> Result<()> {
        if writer.is_none() {
            *writer = Some(arena.create(&format!("{prefix}-{bucket}-"))?);
        }
        if let Some((_, writer)) = writer.as_mut() {
            writer.write_page(page)?;
        }
        Ok(())
    }
}
