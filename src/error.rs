use thiserror::Error;

/// Every message the interpreter can report to a script.
///
/// The `Display` text is what `:echo v:errmsg` shows and what ends up in the
/// value of an error exception (`Vim(cmd):E...`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Evaluation stopped because the interpreter is aborting; never shown.
    #[error("aborted")]
    Aborted,
    #[error("Interrupted")]
    Interrupted,
    /// Free-form message, used by `:echoerr` and for replaying error exceptions.
    #[error("{0}")]
    Message(String),

    // Function definitions
    #[error("E125: Illegal argument: {0}")]
    IllegalArgument(String),
    #[error("E853: Duplicate argument name: {0}")]
    DuplicateArgument(String),
    #[error("E989: Non-default argument follows default argument")]
    NonDefaultAfterDefault,
    #[error("E122: Function {0} already exists, add ! to replace it")]
    FunctionExists(String),
    #[error("E128: Function name must start with a capital or \"s:\": {0}")]
    BadFunctionName(String),
    #[error("E884: Function name cannot contain a colon: {0}")]
    ColonInFunctionName(String),
    #[error("E707: Function name conflicts with variable: {0}")]
    FunctionNameConflict(String),
    #[error("E932: Closure function should not be at top level: {0}")]
    ClosureAtTopLevel(String),
    #[error("E124: Missing '(': {0}")]
    MissingOpenParen(String),
    #[error("E717: Dictionary entry already exists")]
    DictEntryExists,
    #[error("E126: Missing :endfunction")]
    MissingEndfunction,
    #[error("E193: :endfunction not inside a function")]
    EndfunctionOutside,
    #[error("E123: Undefined function: {0}")]
    UndefinedFunction(String),
    #[error("E130: Unknown function: {0}")]
    NoSuchFunction(String),
    #[error("E131: Cannot delete function {0}: It is in use")]
    FunctionInUse(String),

    // Function calls
    #[error("E117: Unknown function: {0}")]
    UnknownFunction(String),
    #[error("E107: Missing parentheses: {0}")]
    MissingParens(String),
    #[error("E700: Unknown function: {0}")]
    UnknownFuncref(String),
    #[error("E933: Function was deleted: {0}")]
    DeletedFunction(String),
    #[error("E118: Too many arguments for function: {0}")]
    TooManyArgs(String),
    #[error("E119: Not enough arguments for function: {0}")]
    NotEnoughArgs(String),
    #[error("E725: Calling dict function without Dictionary: {0}")]
    DictWithoutSelf(String),
    #[error("E132: Function call depth is higher than 'maxfuncdepth'")]
    CallDepth,
    #[error("E169: Command too recursive")]
    CommandTooRecursive,
    #[error("E133: :return not inside a function")]
    ReturnOutsideFunction,
    #[error("E168: :finish used outside of a sourced file")]
    FinishOutsideSource,
    #[error("E1131: Cannot use :defer outside of a function")]
    DeferOutsideFunction,
    #[error("E48: Not allowed in sandbox")]
    Sandbox,
    #[error("E484: Can't open file {0}")]
    CantOpenFile(String),

    // Conditional stack
    #[error("E579: :if nesting too deep")]
    IfNesting,
    #[error("E580: :endif without :if")]
    EndifWithoutIf,
    #[error("E581: :else without :if")]
    ElseWithoutIf,
    #[error("E582: :elseif without :if")]
    ElseifWithoutIf,
    #[error("E583: multiple :else")]
    MultipleElse,
    #[error("E584: :elseif after :else")]
    ElseifAfterElse,
    #[error("E585: :while/:for nesting too deep")]
    LoopNesting,
    #[error("E586: :continue without :while or :for")]
    ContinueWithoutLoop,
    #[error("E587: :break without :while or :for")]
    BreakWithoutLoop,
    #[error("E588: :endwhile without :while")]
    EndwhileWithoutWhile,
    #[error("E588: :endfor without :for")]
    EndforWithoutFor,
    #[error("E732: Using :endfor with :while")]
    EndforWithWhile,
    #[error("E733: Using :endwhile with :for")]
    EndwhileWithFor,
    #[error("E601: :try nesting too deep")]
    TryNesting,
    #[error("E602: :endtry without :try")]
    EndtryWithoutTry,
    #[error("E603: :catch without :try")]
    CatchWithoutTry,
    #[error("E604: :catch after :finally")]
    CatchAfterFinally,
    #[error("E606: :finally without :try")]
    FinallyWithoutTry,
    #[error("E607: multiple :finally")]
    MultipleFinally,
    #[error("E171: Missing :endif")]
    MissingEndif,
    #[error("E170: Missing :endwhile")]
    MissingEndwhile,
    #[error("E170: Missing :endfor")]
    MissingEndfor,
    #[error("E600: Missing :endtry")]
    MissingEndtry,
    #[error("E605: Exception not caught: {0}")]
    UncaughtException(String),
    #[error("E608: Cannot :throw exceptions with 'Vim' prefix")]
    VimPrefix,

    // Commands and expressions
    #[error("E492: Not an editor command: {0}")]
    NotACommand(String),
    #[error("E471: Argument required")]
    ArgumentRequired,
    #[error("E488: Trailing characters: {0}")]
    TrailingCharacters(String),
    #[error("E475: Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("E474: Invalid argument")]
    InvalidJson,
    #[error("E15: Invalid expression: \"{0}\"")]
    InvalidExpression(String),
    #[error("E121: Undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("E108: No such variable: \"{0}\"")]
    NoSuchVariable(String),
    #[error("E46: Cannot change read-only variable \"{0}\"")]
    ReadOnlyVariable(String),
    #[error("E461: Illegal variable name: {0}")]
    IllegalVariableName(String),
    #[error("E110: Missing ')'")]
    MissingParen,
    #[error("E111: Missing ']'")]
    MissingBracket,
    #[error("E114: Missing quote: {0}")]
    MissingDoubleQuote(String),
    #[error("E115: Missing quote: {0}")]
    MissingSingleQuote(String),
    #[error("E116: Invalid arguments for function {0}")]
    InvalidFunctionArgs(String),
    #[error("E696: Missing comma in List: {0}")]
    MissingListComma(String),
    #[error("E697: Missing end of List ']': {0}")]
    MissingListEnd(String),
    #[error("E720: Missing colon in Dictionary: {0}")]
    MissingDictColon(String),
    #[error("E722: Missing comma in Dictionary: {0}")]
    MissingDictComma(String),
    #[error("E723: Missing end of Dictionary '}}': {0}")]
    MissingDictEnd(String),
    #[error("E451: Expected }}: {0}")]
    MissingLambdaEnd(String),
    #[error("E684: list index out of range: {0}")]
    ListIndex(i64),
    #[error("E716: Key not present in Dictionary: \"{0}\"")]
    MissingKey(String),
    #[error("E689: Can only index a List, Dictionary or Blob")]
    NotIndexable,
    #[error("E695: Cannot index a Funcref")]
    IndexFuncref,
    #[error("E690: Missing \"in\" after :for")]
    MissingIn,
    #[error("E714: List required")]
    ListRequired,
    #[error("E715: Dictionary required")]
    DictRequired,
    #[error("E745: Using a List as a Number")]
    ListAsNumber,
    #[error("E728: Using a Dictionary as a Number")]
    DictAsNumber,
    #[error("E703: Using a Funcref as a Number")]
    FuncrefAsNumber,
    #[error("E730: Using List as a String")]
    ListAsString,
    #[error("E731: Using Dictionary as a String")]
    DictAsString,
    #[error("E729: Using Funcref as a String")]
    FuncrefAsString,
    #[error("E691: Can only compare List with List")]
    CompareList,
    #[error("E735: Can only compare Dictionary with Dictionary")]
    CompareDict,
    #[error("E694: Invalid operation for Funcrefs")]
    FuncrefOperation,
    #[error("E692: Invalid operation for List")]
    ListOperation,
    #[error("E736: Invalid operation for Dictionary")]
    DictOperation,
    #[error("E687: Less targets than List items")]
    LessTargets,
    #[error("E688: More targets than List items")]
    MoreTargets,
    #[error("E734: Wrong variable type for {0}=")]
    WrongLetType(String),
    #[error("E701: Invalid type for len()")]
    InvalidLenType,
    #[error("E726: Stride is zero")]
    ZeroStride,
    #[error("E727: Start past end")]
    StartPastEnd,
    #[error("E118: Too many arguments for function: {0}")]
    BuiltinTooMany(String),
    #[error("E119: Not enough arguments for function: {0}")]
    BuiltinTooFew(String),
    #[error("E383: Invalid search string: {0}")]
    InvalidPattern(String),

    // Breakpoints
    #[error("E161: Breakpoint not found: {0}")]
    BreakpointNotFound(String),
}

pub type ScriptResult<T> = Result<T, ScriptError>;

impl ScriptError {
    /// Errors that only mean "stop evaluating", without a message of their own.
    pub fn is_silent(&self) -> bool {
        matches!(self, ScriptError::Aborted)
    }
}
