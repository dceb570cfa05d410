//! Execution events for debuggers and inspectors

use super::frame::FrameInfo;
use crate::syntax::Span;
use crate::value::Value;
use serde::Serialize;

/// Receives VM events. Every method defaults to doing nothing.
pub trait VmObserver {
    /// An instruction attributed to `span` is about to run
    fn node_evaluated(&mut self, _span: Span) {}
    fn variable_defined(&mut self, _name: &str, _value: &Value, _span: Span) {}
    fn variable_updated(&mut self, _name: &str, _value: &Value, _span: Span) {}
    fn frame_pushed(&mut self, _frame: &FrameInfo) {}
    fn frame_popped(&mut self, _frame: &FrameInfo) {}
    fn stack_top_changed(&mut self, _top: Option<&Value>) {}
    fn debugger_entered(&mut self, _span: Span) {}
    /// An Error reached the bottom of the call stack
    fn unrecovered_error(&mut self, _message: &str, _span: Option<Span>) {}
    fn snapshot_requested(&mut self, _snapshot: &VmSnapshot) {}
}

/// One visible variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableInfo {
    pub name: String,
    pub value: String,
    pub type_name: &'static str,
    /// Identity tag for lists and maps
    pub address: Option<u64>,
    pub defined_at: Option<Span>,
}

/// Serializable picture of the VM at a suspension point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmSnapshot {
    pub state: &'static str,
    pub span: Option<Span>,
    pub call_stack: Vec<FrameInfo>,
    pub variables: Vec<VariableInfo>,
    pub stack_top: Option<String>,
}
