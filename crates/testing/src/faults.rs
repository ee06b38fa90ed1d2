/// Runtime failure to inject into a [`crate::ToyRuntime`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TestFault {
    #[default]
    None,
    PullError,
    InspectImageError,
    CreateError,
    StartRejected,
    ExitBeforeRunning,
    DropStartSignal,
    ListError,
    StopError,
    RemoveError,
    NoNetworks,
}
