/// Wake-up reasons for the motor dispatcher.
#[derive(Debug)]
pub enum Impulse {
    LogChanged,
    PollTick,
    SystemInterrupt,
    Error(String),
}
