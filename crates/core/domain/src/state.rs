use serde::{Deserialize, Serialize};
use std::fmt;

/// 资源状态机。
///
/// 数值与持久化/对外接口保持一致：DOWN=0, UP=1, PAUSE=2, STOP=3, PENDING=4, DISABLE=5。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceState {
    Down,
    Up,
    Pause,
    Stop,
    Pending,
    Disable,
}

impl ResourceState {
    pub fn as_u8(self) -> u8 {
        match self {
            ResourceState::Down => 0,
            ResourceState::Up => 1,
            ResourceState::Pause => 2,
            ResourceState::Stop => 3,
            ResourceState::Pending => 4,
            ResourceState::Disable => 5,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ResourceState::Down),
            1 => Some(ResourceState::Up),
            2 => Some(ResourceState::Pause),
            3 => Some(ResourceState::Stop),
            4 => Some(ResourceState::Pending),
            5 => Some(ResourceState::Disable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Down => "DOWN",
            ResourceState::Up => "UP",
            ResourceState::Pause => "PAUSE",
            ResourceState::Stop => "STOP",
            ResourceState::Pending => "PENDING",
            ResourceState::Disable => "DISABLE",
        }
    }

    /// 判断状态迁移是否合法。
    ///
    /// 合法边：
    /// - PENDING → UP / DOWN
    /// - UP → DOWN / STOP
    /// - DOWN → PENDING（监督器重启）
    /// - STOP → PENDING（运维重启）
    /// - DISABLE → PENDING（运维重新启用）
    /// - 任意状态 → DISABLE
    ///
    /// 同状态迁移视为幂等，返回 true。
    pub fn can_transition_to(self, next: ResourceState) -> bool {
        use ResourceState::*;
        if self == next || next == Disable {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Up)
                | (Pending, Down)
                | (Up, Down)
                | (Up, Stop)
                | (Down, Pending)
                | (Stop, Pending)
                | (Disable, Pending)
        )
    }

    /// STOP 与 DISABLE 在运维介入前保持稳定。
    pub fn is_stable(self) -> bool {
        matches!(self, ResourceState::Stop | ResourceState::Disable)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_round_trip() {
        for value in 0..=5u8 {
            let state = ResourceState::from_u8(value).expect("state");
            assert_eq!(state.as_u8(), value);
        }
        assert!(ResourceState::from_u8(6).is_none());
    }

    #[test]
    fn test_transitions() {
        use ResourceState::*;
        assert!(Pending.can_transition_to(Up));
        assert!(Pending.can_transition_to(Down));
        assert!(Down.can_transition_to(Pending));
        assert!(Up.can_transition_to(Stop));
        assert!(Stop.can_transition_to(Disable));
        assert!(Disable.can_transition_to(Pending));

        assert!(!Down.can_transition_to(Up));
        assert!(!Stop.can_transition_to(Up));
        assert!(!Disable.can_transition_to(Up));
        assert!(!Pending.can_transition_to(Stop));
    }

    #[test]
    fn test_serialize_name() {
        let json = serde_json::to_string(&ResourceState::Pending).expect("json");
        assert_eq!(json, "\"PENDING\"");
        assert_eq!(ResourceState::Up.to_string(), "UP");
    }
}
