//! Device manager for PC/SC operations

use pcsc::{Context, Scope};
use tracing::debug;

use crate::{
    config::{MonitorConfig, PcscConfig},
    error::{PcscError, Result},
    monitor::{PcscBackend, ReaderMonitor},
    reader::{CONTACTLESS_MARKER, PcscReader},
    transport::PcscTransport,
};

/// Manager for PC/SC device operations
pub struct PcscDeviceManager {
    /// PC/SC context
    context: Context,
}

impl std::fmt::Debug for PcscDeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcscDeviceManager").finish_non_exhaustive()
    }
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager
    pub fn new() -> Result<Self> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// Names of the attached readers
    pub fn reader_names(&self) -> Result<Vec<String>> {
        match self.context.list_readers_owned() {
            Ok(readers) => Ok(readers
                .into_iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect()),
            Err(pcsc::Error::NoReadersAvailable) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// List all available card readers with card presence and ATR
    pub fn list_readers(&self) -> Result<Vec<PcscReader>> {
        let readers = self.context.list_readers_owned().map_err(|e| match e {
            pcsc::Error::NoReadersAvailable => PcscError::NoReadersAvailable,
            e => e.into(),
        })?;
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut reader_states = [pcsc::ReaderState::new(
                reader_name.as_c_str(),
                pcsc::State::UNAWARE,
            )];

            match self.context.get_status_change(None, &mut reader_states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&reader_states[0])),
                Err(e) => {
                    debug!(reader = ?reader_name, error = %e, "Reader status unavailable");
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        false,
                        None,
                    ));
                }
            }
        }

        Ok(result)
    }

    /// Pick the reader to use
    ///
    /// See [`select_reader`] for the rules.
    pub fn find_reader(&self, name: Option<&str>) -> Result<String> {
        select_reader(&self.reader_names()?, name)
    }

    /// Open a connection to the card in a specific reader
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport> {
        self.open_reader_with_config(reader_name, PcscConfig::default())
    }

    /// Open a connection to a specific reader with custom configuration
    pub fn open_reader_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransport> {
        PcscTransport::connect(self.context.clone(), reader_name, config)
    }

    /// Create a stopped monitor for the reader picked by [`Self::find_reader`]
    pub fn monitor(
        &self,
        name: Option<&str>,
        config: MonitorConfig,
    ) -> Result<ReaderMonitor<PcscBackend>> {
        let reader = self.find_reader(name)?;
        let backend = PcscBackend::new(self.context.clone(), &reader, config.pcsc)?;
        Ok(ReaderMonitor::new(backend, config))
    }
}

/// Pick a reader among `readers`
///
/// An explicit `name` must be attached. Without one, a single attached reader
/// is used as is; otherwise exactly one contactless (`-CL`) reader must exist.
pub fn select_reader(readers: &[String], name: Option<&str>) -> Result<String> {
    if let Some(name) = name {
        return readers
            .iter()
            .find(|reader| reader.as_str() == name)
            .cloned()
            .ok_or_else(|| PcscError::ReaderNotFound(name.to_string()));
    }

    match readers {
        [] => Err(PcscError::NoReadersAvailable),
        [only] => Ok(only.clone()),
        _ => {
            let mut contactless = readers
                .iter()
                .filter(|reader| reader.contains(CONTACTLESS_MARKER));
            match (contactless.next(), contactless.next()) {
                (Some(reader), None) => Ok(reader.clone()),
                _ => Err(PcscError::AmbiguousReader(readers.to_vec())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_explicit_name() {
        let readers = names(&["ACS ACR122U 00 00", "Gemalto 00 00"]);
        assert_eq!(
            select_reader(&readers, Some("Gemalto 00 00")).unwrap(),
            "Gemalto 00 00"
        );
        assert!(matches!(
            select_reader(&readers, Some("missing")),
            Err(PcscError::ReaderNotFound(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_single_reader() {
        let readers = names(&["ACS ACR122U 00 00"]);
        assert_eq!(select_reader(&readers, None).unwrap(), "ACS ACR122U 00 00");
        assert!(matches!(
            select_reader(&[], None),
            Err(PcscError::NoReadersAvailable)
        ));
    }

    #[test]
    fn test_contactless_preferred() {
        let readers = names(&["OMNIKEY 5422 00 00", "OMNIKEY 5422-CL 01 00"]);
        assert_eq!(
            select_reader(&readers, None).unwrap(),
            "OMNIKEY 5422-CL 01 00"
        );
    }

    #[test]
    fn test_ambiguous() {
        let readers = names(&["Reader A", "Reader B"]);
        assert!(matches!(
            select_reader(&readers, None),
            Err(PcscError::AmbiguousReader(list)) if list.len() == 2
        ));

        let readers = names(&["A-CL 00", "B-CL 00", "C 00"]);
        assert!(matches!(
            select_reader(&readers, None),
            Err(PcscError::AmbiguousReader(_))
        ));
    }
}
