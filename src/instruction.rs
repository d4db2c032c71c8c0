use std::fmt;

/// Control command decoded from an instruction payload.
///
/// Matching is exact and case-sensitive. Any other payload decodes to
/// [`Instruction::Unrecognized`] and must not cause a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Start,
    Stop,
    Exit,
    Unrecognized,
}

impl Instruction {
    pub fn decode(payload: &str) -> Self {
        match payload {
            "start" => Instruction::Start,
            "stop" => Instruction::Stop,
            "exit" => Instruction::Exit,
            _ => Instruction::Unrecognized,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Instruction::Start => "start",
            Instruction::Stop => "stop",
            Instruction::Exit => "exit",
            Instruction::Unrecognized => "unrecognized",
        };
        write!(f, "{}", name)
    }
}
