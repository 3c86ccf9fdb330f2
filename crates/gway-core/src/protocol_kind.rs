/// Which client-facing wire protocol a request arrived on, and which upstream wire protocol
/// the selected provider speaks. Error shapes, SSE framing, and translation decisions all key
/// off these two values (spec §4.H, §4.G, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    OpenAi,
    Anthropic,
}
