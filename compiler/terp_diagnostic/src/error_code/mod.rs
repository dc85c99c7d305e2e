//! Error codes for compile-time diagnostics.
//!
//! The first digit names the phase that detects the problem.

use std::fmt;


/// Error codes for all compile diagnostics.
///
/// Format: E#### where the first digit indicates the phase:
/// - E1xxx: Resolution errors (names, imports, declaration cycles)
/// - E2xxx: Type errors
/// - E9xxx: Internal errors
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Resolution Errors (E1xxx)
    /// Undefined identifier
    E1001,
    /// Name redeclared in the same scope
    E1002,
    /// Unknown import path
    E1003,
    /// Initialization cycle or invalid recursive declaration
    E1004,
    /// Undefined field, method or package member
    E1005,
    /// Undefined or misused label
    E1006,
    /// `break`, `continue` or `fallthrough` out of place
    E1007,
    /// Statement outside function body
    E1008,

    // Type Errors (E2xxx)
    /// Type mismatch
    E2001,
    /// Invalid operation for operand types
    E2002,
    /// Wrong argument count
    E2003,
    /// Calling a non-function
    E2004,
    /// Invalid conversion
    E2005,
    /// Constant not representable in type
    E2006,
    /// Type argument does not satisfy constraint
    E2007,
    /// Cannot infer type arguments
    E2008,
    /// Wrong number of type arguments
    E2009,
    /// Assignment count mismatch
    E2010,
    /// Type used as expression or expression used as type
    E2011,
    /// Value computed but not used
    E2012,
    /// Missing return
    E2013,
    /// Invalid receiver or method declaration
    E2014,
    /// Invalid composite literal
    E2015,
    /// Invalid array length
    E2016,
    /// Division by constant zero
    E2017,
    /// Cannot assign to operand
    E2018,
    /// Invalid use of untyped nil
    E2019,
    /// Invalid index, slice, send or receive operand
    E2020,
    /// Type does not implement interface
    E2021,
    /// Type assertion or switch on non-interface
    E2022,
    /// Invalid built-in call
    E2023,

    // Internal Errors (E9xxx)
    /// Internal compiler error
    E9001,
}

impl ErrorCode {
    /// Every error code, in numeric order.
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::E1001,
        ErrorCode::E1002,
        ErrorCode::E1003,
        ErrorCode::E1004,
        ErrorCode::E1005,
        ErrorCode::E1006,
        ErrorCode::E1007,
        ErrorCode::E1008,
        ErrorCode::E2001,
        ErrorCode::E2002,
        ErrorCode::E2003,
        ErrorCode::E2004,
        ErrorCode::E2005,
        ErrorCode::E2006,
        ErrorCode::E2007,
        ErrorCode::E2008,
        ErrorCode::E2009,
        ErrorCode::E2010,
        ErrorCode::E2011,
        ErrorCode::E2012,
        ErrorCode::E2013,
        ErrorCode::E2014,
        ErrorCode::E2015,
        ErrorCode::E2016,
        ErrorCode::E2017,
        ErrorCode::E2018,
        ErrorCode::E2019,
        ErrorCode::E2020,
        ErrorCode::E2021,
        ErrorCode::E2022,
        ErrorCode::E2023,
        ErrorCode::E9001,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E1007 => "E1007",
            ErrorCode::E1008 => "E1008",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::E2006 => "E2006",
            ErrorCode::E2007 => "E2007",
            ErrorCode::E2008 => "E2008",
            ErrorCode::E2009 => "E2009",
            ErrorCode::E2010 => "E2010",
            ErrorCode::E2011 => "E2011",
            ErrorCode::E2012 => "E2012",
            ErrorCode::E2013 => "E2013",
            ErrorCode::E2014 => "E2014",
            ErrorCode::E2015 => "E2015",
            ErrorCode::E2016 => "E2016",
            ErrorCode::E2017 => "E2017",
            ErrorCode::E2018 => "E2018",
            ErrorCode::E2019 => "E2019",
            ErrorCode::E2020 => "E2020",
            ErrorCode::E2021 => "E2021",
            ErrorCode::E2022 => "E2022",
            ErrorCode::E2023 => "E2023",
            ErrorCode::E9001 => "E9001",
        }
    }

    /// One-line explanation.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::E1001 => "undefined identifier",
            ErrorCode::E1002 => "name redeclared in this block",
            ErrorCode::E1003 => "unknown import path",
            ErrorCode::E1004 => "initialization cycle or invalid recursive declaration",
            ErrorCode::E1005 => "undefined field, method or package member",
            ErrorCode::E1006 => "undefined or misused label",
            ErrorCode::E1007 => "branch statement out of place",
            ErrorCode::E1008 => "statement outside function body",
            ErrorCode::E2001 => "type mismatch",
            ErrorCode::E2002 => "invalid operation",
            ErrorCode::E2003 => "wrong argument count",
            ErrorCode::E2004 => "cannot call non-function",
            ErrorCode::E2005 => "invalid conversion",
            ErrorCode::E2006 => "constant not representable",
            ErrorCode::E2007 => "type argument does not satisfy constraint",
            ErrorCode::E2008 => "cannot infer type arguments",
            ErrorCode::E2009 => "wrong number of type arguments",
            ErrorCode::E2010 => "assignment count mismatch",
            ErrorCode::E2011 => "type and value used interchangeably",
            ErrorCode::E2012 => "value is not used",
            ErrorCode::E2013 => "missing return",
            ErrorCode::E2014 => "invalid receiver",
            ErrorCode::E2015 => "invalid composite literal",
            ErrorCode::E2016 => "invalid array length",
            ErrorCode::E2017 => "division by zero",
            ErrorCode::E2018 => "cannot assign",
            ErrorCode::E2019 => "use of untyped nil",
            ErrorCode::E2020 => "invalid index, slice or channel operand",
            ErrorCode::E2021 => "type does not implement interface",
            ErrorCode::E2022 => "type assertion on non-interface",
            ErrorCode::E2023 => "invalid built-in call",
            ErrorCode::E9001 => "internal error",
        }
    }

    /// E1xxx
    pub fn is_resolution_error(&self) -> bool {
        self.as_str().starts_with("E1")
    }

    /// E2xxx
    pub fn is_type_error(&self) -> bool {
        self.as_str().starts_with("E2")
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse an error code string like `"E2001"`. Case-insensitive.
pub fn parse_error_code(s: &str) -> Option<ErrorCode> {
    let upper = s.trim().to_ascii_uppercase();
    ErrorCode::ALL
        .iter()
        .copied()
        .find(|code| code.as_str() == upper)
}
