/// Who observed, for which project, with which telescope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObsInfo {
    /// Observer name
    pub observer: String,
    /// Project identifier
    pub project_id: String,
    /// Telescope name
    pub telescope: String,
}
