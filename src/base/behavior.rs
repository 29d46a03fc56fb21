use std::sync::Arc;

/// Clocked behavior shared by every component of the controller model.
pub trait ModuleBehaviors {
    /// Advance one clock edge.
    fn tick_one(&mut self);

    /// Return to the power-on state.
    fn reset(&mut self) {}
}

pub trait Parameterizable {
    type ConfigType;

    fn conf(&self) -> &Self::ConfigType;

    fn init_conf(&mut self, conf: Arc<Self::ConfigType>);
}
