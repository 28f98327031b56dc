//! Query-side facade over a container
//!
//! The [`Connector`] is what viewers and analysis code use: score-filtered
//! iteration and random access over reads, class counts per classification, and
//! the two write paths that change an existing container (reclassification and
//! aux updates). Each write reopens the container so later queries see it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::classification::{ClassificationType, Classifications};
use crate::companion::{CompanionFileLocator, CompanionKind, NoLocator};
use crate::container::{AuxData, Container, Modifier, ReadBlockIterator, ReadsForClassIterator};
use crate::error::{Error, Result};
use crate::record::{ReadBlock, RecordId};
use crate::CancelFlag;

/// Read and reclassify access to one container file
///
/// # Examples
///
/// ```no_run
/// # use rma3::{ClassificationType, Connector, Result};
/// # fn main() -> Result<()> {
/// let connector = Connector::open("sample.rma3")?;
/// for (taxon, count) in connector.classification_block(ClassificationType::Taxonomy)? {
///     println!("{taxon}\t{count}");
/// }
/// for read in connector.reads_for_class(ClassificationType::Taxonomy, 562, 50.0, 0.01)? {
///     let read = read?;
///     println!("{}", read.header().unwrap_or_default());
/// }
/// # Ok(())
/// # }
/// ```
///
/// If a reclassification fails after the file was truncated, the connector
/// holds on to the modifier and the aux entries of the last complete suffix.
/// Queries then fail with [`Error::Interrupted`] until
/// [`Connector::update_classifications`] is called again.
pub struct Connector {
    path: PathBuf,
    /// `None` while an interrupted update is pending
    container: Option<Container>,
    interrupted: Option<InterruptedUpdate>,
    locator: Arc<dyn CompanionFileLocator + Send + Sync>,
}

/// A reclassification that failed after truncating the file
struct InterruptedUpdate {
    modifier: Modifier,
    aux: AuxData,
}

impl Connector {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let container = Container::open(&path)?;
        Ok(Self {
            path,
            container: Some(container),
            interrupted: None,
            locator: Arc::new(NoLocator),
        })
    }

    /// Sets the locator consulted when a companion file has moved
    #[must_use]
    pub fn with_locator<L>(mut self, locator: L) -> Self
    where
        L: CompanionFileLocator + Send + Sync + 'static,
    {
        self.locator = Arc::new(locator);
        if let Some(container) = &mut self.container {
            container.set_locator(Arc::clone(&self.locator));
        }
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the underlying container, `None` while an update is interrupted
    #[must_use]
    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    /// Returns whether a failed update has to be retried before queries work
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.is_some()
    }

    fn opened(&self) -> Result<&Container> {
        self.container.as_ref().ok_or(Error::Interrupted)
    }

    /// Iterates over all reads in file order
    pub fn all_reads(&self, min_score: f32, max_expected: f32) -> Result<ReadBlockIterator> {
        Ok(self
            .opened()?
            .getter()
            .min_score(min_score)
            .max_expected(max_expected)
            .into_iter())
    }

    /// Iterates over the reads assigned to a class
    ///
    /// A read is returned even if none of its matches pass the filters.
    pub fn reads_for_class(
        &self,
        ctype: ClassificationType,
        class_id: i32,
        min_score: f32,
        max_expected: f32,
    ) -> Result<ReadsForClassIterator> {
        self.reads_for_classes(ctype, &[class_id], min_score, max_expected)
    }

    /// Iterates over the reads assigned to any of the classes, each read once
    pub fn reads_for_classes(
        &self,
        ctype: ClassificationType,
        class_ids: &[i32],
        min_score: f32,
        max_expected: f32,
    ) -> Result<ReadsForClassIterator> {
        Ok(self
            .opened()?
            .reads_for_classes(ctype, class_ids)?
            .map_getter(|getter| getter.min_score(min_score).max_expected(max_expected)))
    }

    /// Returns one read by identifier
    pub fn get_read(&self, uid: RecordId, min_score: f32, max_expected: f32) -> Result<ReadBlock> {
        self.opened()?
            .getter()
            .min_score(min_score)
            .max_expected(max_expected)
            .get(uid)
    }

    /// Returns the class id to read count map of a classification
    pub fn classification_block(&self, ctype: ClassificationType) -> Result<BTreeMap<i32, usize>> {
        self.opened()?.classification_counts(ctype)
    }

    /// Returns the number of classes of a classification
    pub fn classification_size(&self, ctype: ClassificationType) -> Result<usize> {
        Ok(self.opened()?.classification_counts(ctype)?.len())
    }

    /// Returns the number of reads assigned to one class
    pub fn class_size(&self, ctype: ClassificationType, class_id: i32) -> Result<usize> {
        self.opened()?.class_size(ctype, class_id)
    }

    /// Returns the names of the classifications indexed by the container
    pub fn classification_names(&self) -> Result<Vec<&'static str>> {
        Ok(self
            .opened()?
            .classification_types()
            .map(|ctype| ctype.name())
            .collect())
    }

    pub fn number_of_reads(&self) -> Result<u64> {
        Ok(self.opened()?.number_of_reads())
    }

    pub fn number_of_matches(&self) -> Result<u64> {
        Ok(self.opened()?.number_of_matches())
    }

    /// Replaces the classification index, keeping the aux entries
    ///
    /// This also retries an interrupted update with the new classifications.
    pub fn update_classifications(&mut self, classifications: Classifications) -> Result<()> {
        self.update(classifications, None)
    }

    /// Replaces the classification index, polling `cancel` per class
    ///
    /// If canceled after the file was truncated, the connector is interrupted
    /// until the update is retried.
    pub fn update_classifications_with_cancel(
        &mut self,
        classifications: Classifications,
        cancel: &CancelFlag,
    ) -> Result<()> {
        self.update(classifications, Some(cancel))
    }

    fn update(
        &mut self,
        classifications: Classifications,
        cancel: Option<&CancelFlag>,
    ) -> Result<()> {
        let (mut modifier, aux) = match self.interrupted.take() {
            Some(InterruptedUpdate { modifier, aux }) => (modifier, aux),
            None => {
                let aux = self.opened()?.aux()?;
                (Modifier::open(&self.path)?, aux)
            }
        };
        let result = modifier.update(classifications, &aux, cancel);
        self.settle(modifier, aux, result)
    }

    /// Reopens the container after an update, or keeps the update for a retry
    fn settle(&mut self, modifier: Modifier, aux: AuxData, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => self.reopen(),
            Err(e) => {
                if modifier.is_interrupted() {
                    self.container = None;
                    self.interrupted = Some(InterruptedUpdate { modifier, aux });
                }
                Err(e)
            }
        }
    }

    /// Returns all aux entries
    ///
    /// While an update is interrupted, these are the entries it will write.
    pub fn get_aux(&self) -> Result<AuxData> {
        match &self.interrupted {
            Some(interrupted) => Ok(interrupted.aux.clone()),
            None => self.opened()?.aux(),
        }
    }

    /// Adds aux entries; existing entries of the same name are replaced
    pub fn put_aux(&mut self, entries: AuxData) -> Result<()> {
        let mut aux = self.opened()?.aux()?;
        aux.merge(entries);
        Modifier::open(&self.path)?.update_aux(&aux)?;
        self.reopen()
    }

    /// Records a new location for a companion file
    pub fn relocate_companion(&mut self, kind: CompanionKind, path: &Path) -> Result<()> {
        self.opened()?;
        Modifier::open(&self.path)?.relocate_companion(kind, path)?;
        self.reopen()
    }

    fn reopen(&mut self) -> Result<()> {
        self.container = None;
        let mut container = Container::open(&self.path)?;
        container.set_locator(Arc::clone(&self.locator));
        self.container = Some(container);
        Ok(())
    }
}
