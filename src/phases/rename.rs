// Rename planning and execution.
//
// For every lot in final order, every retained image index (main then
// extra) gets `{modePrefix}-{lotNumber}.{sequenceWithinLot}.jpg`; the
// sequence restarts at 1 per lot and each global index is renamed at most
// once (first-claiming lot wins). Execution fetches the old bytes,
// re-uploads under the new key, and rewires every lot/item reference.
// A per-image failure leaves that URL unchanged: partial success beats
// job failure.

use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::core::types::{ImageRef, Lot, SubMode};
use crate::services::ObjectStore;
use crate::utils::{ProgressTracker, StepKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOp {
    pub global_index: usize,
    pub old_url: String,
    pub new_name: String,
}

/// Derive the rename plan from the final lot order
pub fn plan_renames(lots: &[Lot], images: &[ImageRef]) -> Vec<RenameOp> {
    let mut claimed: HashSet<usize> = HashSet::new();
    let mut ops = Vec::new();

    for lot in lots {
        let prefix = lot.sub_mode.unwrap_or(SubMode::SingleLot).file_prefix();
        let Some(number) = lot.lot_number else {
            continue;
        };

        let mut sequence = 1usize;
        for &index in lot.image_indexes.iter().chain(lot.extra_image_indexes.iter()) {
            if index >= images.len() || !claimed.insert(index) {
                continue;
            }
            ops.push(RenameOp {
                global_index: index,
                old_url: images[index].url.clone(),
                new_name: format!("{}-{}.{}.jpg", prefix, number, sequence),
            });
            sequence += 1;
        }
    }

    ops
}

/// Execute the plan against object storage and rewire all references.
/// Returns the same-length replacement image array: position i is the image
/// originally at i, renamed where the plan succeeded.
pub async fn execute_renames(
    store: &dyn ObjectStore,
    images: &[ImageRef],
    lots: &mut [Lot],
    key_prefix: &str,
    concurrency: usize,
    progress: &ProgressTracker,
) -> Vec<ImageRef> {
    let ops = plan_renames(lots, images);
    let total = ops.len();
    debug!("renaming {} images", total);

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let done = Arc::new(AtomicUsize::new(0));

    let tasks = ops.into_iter().map(|op| {
        let semaphore = Arc::clone(&semaphore);
        let done = Arc::clone(&done);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");

            let result: Result<(usize, String, String), String> = async {
                let bytes = store.get(&op.old_url).await.map_err(|e| e.to_string())?;
                let key = format!("{}/{}", key_prefix, op.new_name);
                let new_url = store
                    .put(bytes, "image/jpeg", &key)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok((op.global_index, new_url, op.new_name.clone()))
            }
            .await;

            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            progress.publish_partial(StepKey::Rename, finished, total);

            match result {
                Ok(renamed) => Some(renamed),
                Err(e) => {
                    warn!(
                        "rename failed for image {} ({}), keeping old URL: {}",
                        op.global_index, op.new_name, e
                    );
                    None
                }
            }
        }
    });

    let results = join_all(tasks).await;

    // Replacement array: untouched positions keep their original reference
    let mut replaced: Vec<ImageRef> = images.to_vec();
    let mut url_map: HashMap<String, String> = HashMap::new();
    let mut renamed_count = 0usize;

    for (global_index, new_url, new_name) in results.into_iter().flatten() {
        url_map.insert(images[global_index].url.clone(), new_url.clone());
        replaced[global_index] = ImageRef {
            url: new_url,
            name: new_name,
        };
        renamed_count += 1;
    }

    rewire_references(lots, &replaced, &url_map);

    debug!("renamed {}/{} images", renamed_count, total);
    replaced
}

/// Rewrite every image reference in the lot list from the replacement array
fn rewire_references(lots: &mut [Lot], replaced: &[ImageRef], url_map: &HashMap<String, String>) {
    for lot in lots.iter_mut() {
        lot.image_urls = lot
            .image_indexes
            .iter()
            .filter(|&&i| i < replaced.len())
            .map(|&i| replaced[i].url.clone())
            .collect();
        lot.extra_image_urls = lot
            .extra_image_indexes
            .iter()
            .filter(|&&i| i < replaced.len())
            .map(|&i| replaced[i].url.clone())
            .collect();

        if let Some(cover) = lot.cover_url.take() {
            lot.cover_url = Some(url_map.get(&cover).cloned().unwrap_or(cover));
        }

        for item in lot.items.iter_mut() {
            match item.image_index {
                Some(i) if i < replaced.len() => {
                    item.image_url = Some(replaced[i].url.clone());
                }
                _ => {
                    if let Some(url) = item.image_url.take() {
                        item.image_url = Some(url_map.get(&url).cloned().unwrap_or(url));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{StorageError, StorageResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn images(n: usize) -> Vec<ImageRef> {
        (0..n)
            .map(|i| ImageRef {
                url: format!("http://store/orig/{}.jpg", i),
                name: format!("orig-{}.jpg", i),
            })
            .collect()
    }

    fn lot(sub_mode: SubMode, number: u64, indexes: Vec<usize>, all: &[ImageRef]) -> Lot {
        let mut lot = Lot::with_id();
        lot.sub_mode = Some(sub_mode);
        lot.lot_number = Some(number);
        lot.image_urls = indexes.iter().map(|&i| all[i].url.clone()).collect();
        lot.cover_url = indexes.first().map(|&i| all[i].url.clone());
        lot.image_indexes = indexes;
        lot
    }

    #[test]
    fn test_per_item_filename() {
        let images = images(2);
        let lots = vec![lot(SubMode::PerItem, 3, vec![1], &images)];
        let ops = plan_renames(&lots, &images);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].new_name, "peritem-3.1.jpg");
        assert_eq!(ops[0].global_index, 1);
    }

    #[test]
    fn test_catalogue_sequence_in_index_order() {
        let images = images(5);
        let lots = vec![lot(SubMode::Catalogue, 7, vec![2, 3, 4], &images)];
        let ops = plan_renames(&lots, &images);
        let names: Vec<&str> = ops.iter().map(|op| op.new_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["catalogue-7.1.jpg", "catalogue-7.2.jpg", "catalogue-7.3.jpg"]
        );
    }

    #[test]
    fn test_sequence_restarts_per_lot_and_covers_extras() {
        let images = images(6);
        let mut first = lot(SubMode::SingleLot, 1, vec![0, 1], &images);
        first.extra_image_indexes = vec![2];
        let second = lot(SubMode::SingleLot, 2, vec![3], &images);

        let ops = plan_renames(&[first, second], &images);
        let names: Vec<&str> = ops.iter().map(|op| op.new_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["single-1.1.jpg", "single-1.2.jpg", "single-1.3.jpg", "single-2.1.jpg"]
        );
    }

    #[test]
    fn test_first_claiming_lot_wins() {
        let images = images(3);
        let lots = vec![
            lot(SubMode::PerPhoto, 1, vec![0, 2], &images),
            lot(SubMode::PerPhoto, 2, vec![2, 1], &images),
        ];
        let ops = plan_renames(&lots, &images);
        // Index 2 is claimed by lot 1; lot 2 renames only index 1
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[1].global_index, 2);
        assert_eq!(ops[1].new_name, "perphoto-1.2.jpg");
        assert_eq!(ops[2].global_index, 1);
        assert_eq!(ops[2].new_name, "perphoto-2.1.jpg");
    }

    struct MemoryStore {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        fail_keys: Vec<String>,
    }

    impl MemoryStore {
        fn with_images(images: &[ImageRef]) -> Self {
            let objects = images
                .iter()
                .map(|img| (img.url.clone(), vec![0u8; 4]))
                .collect();
            Self {
                objects: Mutex::new(objects),
                fail_keys: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(
            &self,
            bytes: Vec<u8>,
            _content_type: &str,
            key: &str,
        ) -> StorageResult<String> {
            if self.fail_keys.iter().any(|k| key.contains(k.as_str())) {
                return Err(StorageError::UnexpectedStatus {
                    status: 500,
                    url: key.to_string(),
                });
            }
            let url = format!("http://store/{}", key);
            self.objects.lock().insert(url.clone(), bytes);
            Ok(url)
        }

        async fn get(&self, url: &str) -> StorageResult<Vec<u8>> {
            self.objects
                .lock()
                .get(url)
                .cloned()
                .ok_or(StorageError::UnexpectedStatus {
                    status: 404,
                    url: url.to_string(),
                })
        }
    }

    #[tokio::test]
    async fn test_execute_rewires_all_references() {
        let images = images(3);
        let store = MemoryStore::with_images(&images);
        let mut lots = vec![lot(SubMode::PerItem, 3, vec![1], &images)];
        let progress = ProgressTracker::new("t");

        let replaced =
            execute_renames(&store, &images, &mut lots, "job-1", 2, &progress).await;

        assert_eq!(replaced.len(), 3);
        assert_eq!(replaced[1].url, "http://store/job-1/peritem-3.1.jpg");
        assert_eq!(replaced[1].name, "peritem-3.1.jpg");
        // Unclaimed positions keep the original reference
        assert_eq!(replaced[0], images[0]);
        assert_eq!(replaced[2], images[2]);

        assert_eq!(lots[0].image_urls, vec!["http://store/job-1/peritem-3.1.jpg"]);
        assert_eq!(
            lots[0].cover_url.as_deref(),
            Some("http://store/job-1/peritem-3.1.jpg")
        );
    }

    #[tokio::test]
    async fn test_per_image_failure_keeps_old_url() {
        let images = images(3);
        let mut store = MemoryStore::with_images(&images);
        store.fail_keys = vec!["catalogue-7.2.jpg".to_string()];

        let mut lots = vec![lot(SubMode::Catalogue, 7, vec![0, 1, 2], &images)];
        let progress = ProgressTracker::new("t");

        let replaced =
            execute_renames(&store, &images, &mut lots, "job-2", 2, &progress).await;

        assert_eq!(replaced[0].url, "http://store/job-2/catalogue-7.1.jpg");
        // Failed rename leaves the original URL in place
        assert_eq!(replaced[1], images[1]);
        assert_eq!(replaced[2].url, "http://store/job-2/catalogue-7.3.jpg");
        assert_eq!(lots[0].image_urls[1], images[1].url);
    }
}
