use std::fmt;

/// Ordered startup phases. The sequence is strict: a phase never starts
/// before the previous one completed, and the current phase never regresses
/// within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum InitPhase {
    DatabaseInit = 0,
    ResourceManagers = 1,
    AiModelLoading = 2,
    CommunicationProtocol = 3,
    IndividualServices = 4,
    UiComponents = 5,
    Complete = 6,
}

impl InitPhase {
    /// Execution order, excluding the terminal marker.
    pub const SEQUENCE: [InitPhase; 6] = [
        InitPhase::DatabaseInit,
        InitPhase::ResourceManagers,
        InitPhase::AiModelLoading,
        InitPhase::CommunicationProtocol,
        InitPhase::IndividualServices,
        InitPhase::UiComponents,
    ];

    pub fn from_index(index: u8) -> InitPhase {
        match index {
            0 => InitPhase::DatabaseInit,
            1 => InitPhase::ResourceManagers,
            2 => InitPhase::AiModelLoading,
            3 => InitPhase::CommunicationProtocol,
            4 => InitPhase::IndividualServices,
            5 => InitPhase::UiComponents,
            _ => InitPhase::Complete,
        }
    }
}

impl fmt::Display for InitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitPhase::DatabaseInit => "database_init",
            InitPhase::ResourceManagers => "resource_managers",
            InitPhase::AiModelLoading => "ai_model_loading",
            InitPhase::CommunicationProtocol => "communication_protocol",
            InitPhase::IndividualServices => "individual_services",
            InitPhase::UiComponents => "ui_components",
            InitPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}
