//! List, byte-array, and string primitives.
//!
//! Lists are growable: data word 0 holds the item count, items live in
//! words 1..count, and the remaining words are spare capacity. Strings are
//! NUL-terminated UTF-8 indexed by codepoint. Byte arrays expose every byte
//! of their data words; there is no sub-word length field.

use crate::error::{ErrorCode, PrimResult};
use crate::mem::{ClassId, ObjectMemory};
use crate::prims::{PrimEntry, PrimitiveRegistry};
use crate::value::{int2obj, obj2int, Obj, FALSE_OBJ};
use crate::vm::{obj_to_wire, printed_text, Vm};

pub fn add_data_prims(registry: &mut PrimitiveRegistry) {
    registry.add_set(
        "data",
        &[
            PrimEntry { name: "makeList", handler: prim_make_list },
            PrimEntry { name: "newArray", handler: prim_new_array },
            PrimEntry { name: "newByteArray", handler: prim_new_byte_array },
            PrimEntry { name: "length", handler: prim_length },
            PrimEntry { name: "at", handler: prim_at },
            PrimEntry { name: "atPut", handler: prim_at_put },
            PrimEntry { name: "addLast", handler: prim_add_last },
            PrimEntry { name: "delete", handler: prim_delete },
            PrimEntry { name: "fill", handler: prim_fill },
            PrimEntry { name: "copyFromTo", handler: prim_copy_from_to },
            PrimEntry { name: "join", handler: prim_join },
            PrimEntry { name: "joinStrings", handler: prim_join_strings },
            PrimEntry { name: "findInString", handler: prim_find_in_string },
            PrimEntry { name: "freeMemory", handler: prim_free_memory },
        ],
    );
}

pub fn add_io_prims(registry: &mut PrimitiveRegistry) {
    registry.add_set("io", &[PrimEntry { name: "printIt", handler: prim_print }]);
}

// UTF-8 scanning

/// Position of the codepoint following the one at `pos`. At the end of the
/// slice the position is returned unchanged.
pub fn next_utf8(bytes: &[u8], pos: usize) -> usize {
    let Some(&byte) = bytes.get(pos) else {
        return pos;
    };
    if byte < 128 {
        return pos + 1;
    }
    let mut p = pos;
    if byte & 0xC0 == 0xC0 {
        p += 1;
    }
    while bytes.get(p).is_some_and(|&b| b & 0xC0 == 0x80) {
        p += 1;
    }
    p
}

pub fn count_utf8(bytes: &[u8]) -> usize {
    let mut count = 0;
    let mut pos = 0;
    while pos < bytes.len() {
        pos = next_utf8(bytes, pos);
        count += 1;
    }
    count
}

/// Byte offset of the zero-based `codepoint_index`th codepoint.
fn utf8_offset(bytes: &[u8], codepoint_index: usize) -> usize {
    let mut pos = 0;
    for _ in 0..codepoint_index {
        pos = next_utf8(bytes, pos);
    }
    pos
}

// Index arguments: a 1-based integer, or one of the special strings.

enum IndexArg {
    At(i32),
    Last,
    Random,
    All,
}

fn parse_index(mem: &ObjectMemory, arg: Obj) -> Option<IndexArg> {
    if arg.is_int() {
        return Some(IndexArg::At(obj2int(arg)));
    }
    if mem.is_class(arg, ClassId::String) {
        return match mem.string_bytes(arg).as_slice() {
            b"last" => Some(IndexArg::Last),
            b"random" => Some(IndexArg::Random),
            b"all" => Some(IndexArg::All),
            _ => None,
        };
    }
    None
}

/// Logical item count of a list, clamped to its capacity.
pub(crate) fn list_count(mem: &ObjectMemory, list: Obj) -> usize {
    let count = obj2int(mem.field(list, 0)).max(0) as usize;
    count.min(mem.obj_words(list).saturating_sub(1))
}

fn immediate_text(obj: Obj) -> Option<String> {
    if obj.is_int() {
        return Some(obj2int(obj).to_string());
    }
    if obj.is_boolean() {
        return Some(if obj == crate::value::TRUE_OBJ { "true" } else { "false" }.to_string());
    }
    None
}

// Primitives

fn prim_make_list(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    // An empty makeList still reserves a couple of slots so the first
    // addLast does not have to grow.
    let capacity = args.len().max(2);
    let list = vm
        .mem
        .alloc(ClassId::List, capacity + 1, int2obj(0))
        .ok_or(ErrorCode::InsufficientMemoryError)?;
    vm.mem.set_field(list, 0, int2obj(args.len() as i32));
    for (i, &item) in args.iter().enumerate() {
        vm.mem.set_field(list, i + 1, item);
    }
    Ok(list)
}

fn prim_new_array(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    const MIN_CAPACITY: i32 = 2;
    let capacity = match args.first() {
        Some(&arg) if arg.is_int() => obj2int(arg).max(MIN_CAPACITY),
        _ => MIN_CAPACITY,
    } as usize;
    let list = vm
        .mem
        .alloc(ClassId::List, capacity + 1, int2obj(0))
        .ok_or(ErrorCode::InsufficientMemoryError)?;
    Ok(list)
}

fn prim_new_byte_array(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    let byte_count = match args.first() {
        Some(&arg) if arg.is_int() => obj2int(arg).max(0) as usize,
        _ => 0,
    };
    vm.mem
        .alloc(ClassId::ByteArray, byte_count.div_ceil(4), Obj::from_raw(0))
        .ok_or(ErrorCode::InsufficientMemoryError)
}

fn prim_length(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    let &obj = args.first().ok_or(ErrorCode::NotEnoughArguments)?;
    if vm.mem.is_class(obj, ClassId::List) {
        return Ok(vm.mem.field(obj, 0));
    }
    if vm.mem.is_class(obj, ClassId::ByteArray) {
        return Ok(int2obj(vm.mem.byte_array_len(obj) as i32));
    }
    if vm.mem.is_class(obj, ClassId::String) {
        return Ok(int2obj(count_utf8(&vm.mem.string_bytes(obj)) as i32));
    }
    Err(ErrorCode::NeedsArrayError)
}

fn resolve_index(vm: &mut Vm, arg: Obj, count: usize) -> Result<usize, ErrorCode> {
    match parse_index(&vm.mem, arg) {
        Some(IndexArg::At(i)) => {
            if i < 1 || i as usize > count {
                Err(ErrorCode::IndexOutOfRangeError)
            } else {
                Ok(i as usize)
            }
        }
        Some(IndexArg::Last) if count > 0 => Ok(count),
        Some(IndexArg::Random) if count > 0 => {
            Ok((vm.next_random() as usize % count) + 1)
        }
        Some(IndexArg::Last) | Some(IndexArg::Random) => Err(ErrorCode::IndexOutOfRangeError),
        Some(IndexArg::All) | None => Err(ErrorCode::NeedsIntegerIndexError),
    }
}

fn prim_at(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let obj = args[1];
    if vm.mem.is_class(obj, ClassId::List) {
        let count = list_count(&vm.mem, obj);
        let i = resolve_index(vm, args[0], count)?;
        return Ok(vm.mem.field(obj, i));
    }
    if vm.mem.is_class(obj, ClassId::String) {
        let bytes = vm.mem.string_bytes(obj);
        let count = count_utf8(&bytes);
        let i = resolve_index(vm, args[0], count)?;
        let start = utf8_offset(&bytes, i - 1);
        let end = next_utf8(&bytes, start);
        return vm
            .mem
            .new_string_from_bytes(&bytes[start..end])
            .ok_or(ErrorCode::InsufficientMemoryError);
    }
    if vm.mem.is_class(obj, ClassId::ByteArray) {
        let count = vm.mem.byte_array_len(obj);
        let i = resolve_index(vm, args[0], count)?;
        return Ok(int2obj(vm.mem.data_byte(obj, i - 1) as i32));
    }
    Err(ErrorCode::NeedsArrayError)
}

fn byte_value(value: Obj) -> Result<u8, ErrorCode> {
    if !value.is_int() {
        return Err(ErrorCode::ByteArrayStoreError);
    }
    let n = obj2int(value);
    if !(0..=255).contains(&n) {
        return Err(ErrorCode::ByteArrayStoreError);
    }
    Ok(n as u8)
}

fn prim_at_put(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 3 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let obj = args[1];
    let value = args[2];
    if vm.mem.is_class(obj, ClassId::List) {
        let count = list_count(&vm.mem, obj);
        if let Some(IndexArg::All) = parse_index(&vm.mem, args[0]) {
            for i in 1..=count {
                vm.mem.set_field(obj, i, value);
            }
            return Ok(FALSE_OBJ);
        }
        let i = resolve_index(vm, args[0], count)?;
        vm.mem.set_field(obj, i, value);
        return Ok(FALSE_OBJ);
    }
    if vm.mem.is_class(obj, ClassId::ByteArray) {
        let byte = byte_value(value)?;
        let count = vm.mem.byte_array_len(obj);
        if let Some(IndexArg::All) = parse_index(&vm.mem, args[0]) {
            for i in 0..count {
                vm.mem.set_data_byte(obj, i, byte);
            }
            return Ok(FALSE_OBJ);
        }
        let i = resolve_index(vm, args[0], count)?;
        vm.mem.set_data_byte(obj, i - 1, byte);
        return Ok(FALSE_OBJ);
    }
    Err(ErrorCode::NeedsArrayError)
}

fn prim_add_last(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let mut list = args[1];
    if !vm.mem.is_class(list, ClassId::List) {
        return Err(ErrorCode::NeedsArrayError);
    }
    let count = list_count(&vm.mem, list);
    let capacity = vm.mem.obj_words(list) - 1;
    if count >= capacity {
        let grow_by = (count / 3).clamp(3, 100);
        // The resize may relocate the list; every held reference is stale
        // after this point.
        list = vm
            .mem
            .resize(list, vm.mem.obj_words(list) + grow_by)
            .ok_or(ErrorCode::InsufficientMemoryError)?;
    }
    vm.mem.set_field(list, count + 1, args[0]);
    vm.mem.set_field(list, 0, int2obj((count + 1) as i32));
    Ok(list)
}

fn prim_delete(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let list = args[1];
    if !vm.mem.is_class(list, ClassId::List) {
        return Err(ErrorCode::NeedsArrayError);
    }
    let count = list_count(&vm.mem, list);
    match parse_index(&vm.mem, args[0]) {
        Some(IndexArg::All) => {
            for i in 0..=count {
                vm.mem.set_field(list, i, int2obj(0));
            }
            Ok(FALSE_OBJ)
        }
        Some(IndexArg::Last) => {
            if count > 0 {
                vm.mem.set_field(list, count, int2obj(0));
                vm.mem.set_field(list, 0, int2obj((count - 1) as i32));
            }
            Ok(FALSE_OBJ)
        }
        Some(IndexArg::At(index)) => {
            if index < 1 || index as usize > count {
                return Err(ErrorCode::IndexOutOfRangeError);
            }
            let mut i = index as usize;
            while i < count {
                let next = vm.mem.field(list, i + 1);
                vm.mem.set_field(list, i, next);
                i += 1;
            }
            vm.mem.set_field(list, count, int2obj(0));
            vm.mem.set_field(list, 0, int2obj((count - 1) as i32));
            Ok(FALSE_OBJ)
        }
        Some(IndexArg::Random) | None => Err(ErrorCode::NeedsIntegerError),
    }
}

fn prim_fill(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let obj = args[0];
    let value = args[1];
    if vm.mem.is_class(obj, ClassId::List) {
        let count = list_count(&vm.mem, obj);
        for i in 1..=count {
            vm.mem.set_field(obj, i, value);
        }
        return Ok(FALSE_OBJ);
    }
    if vm.mem.is_class(obj, ClassId::ByteArray) {
        let byte = byte_value(value)?;
        for i in 0..vm.mem.byte_array_len(obj) {
            vm.mem.set_data_byte(obj, i, byte);
        }
        return Ok(FALSE_OBJ);
    }
    Err(ErrorCode::NeedsArrayError)
}

fn prim_copy_from_to(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    if !args[1].is_int() {
        return Err(ErrorCode::NeedsIntegerError);
    }
    let start = obj2int(args[1]).max(1) as usize;
    let explicit_end = match args.get(2) {
        Some(&arg) if arg.is_int() => Some(obj2int(arg)),
        Some(_) => return Err(ErrorCode::NeedsIntegerError),
        None => None,
    };

    let src = args[0];
    if vm.mem.is_class(src, ClassId::List) {
        let src_len = list_count(&vm.mem, src);
        let end = (explicit_end.unwrap_or(src_len as i32).min(src_len as i32)).max(0) as usize;
        let result_len = (end + 1).saturating_sub(start);
        let result = vm
            .mem
            .alloc(ClassId::List, result_len + 1, int2obj(0))
            .ok_or(ErrorCode::InsufficientMemoryError)?;
        vm.mem.set_field(result, 0, int2obj(result_len as i32));
        for offset in 0..result_len {
            let item = vm.mem.field(src, start + offset);
            vm.mem.set_field(result, offset + 1, item);
        }
        return Ok(result);
    }
    if vm.mem.is_class(src, ClassId::String) {
        let bytes = vm.mem.string_bytes(src);
        let src_len = count_utf8(&bytes);
        let end = (explicit_end.unwrap_or(src_len as i32).min(src_len as i32)).max(0) as usize;
        if start > end {
            return vm
                .mem
                .new_string_from_bytes(&[])
                .ok_or(ErrorCode::InsufficientMemoryError);
        }
        let byte_start = utf8_offset(&bytes, start - 1);
        let byte_end = utf8_offset(&bytes, end);
        return vm
            .mem
            .new_string_from_bytes(&bytes[byte_start..byte_end])
            .ok_or(ErrorCode::InsufficientMemoryError);
    }
    Err(ErrorCode::NeedsIndexable)
}

fn prim_join(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let first = args[0];
    if vm.mem.is_class(first, ClassId::List) {
        let mut total = 0;
        for &arg in args {
            if !vm.mem.is_class(arg, ClassId::List) {
                return Err(ErrorCode::JoinArgsNotSameType);
            }
            total += list_count(&vm.mem, arg);
        }
        let result = vm
            .mem
            .alloc(ClassId::List, total + 1, int2obj(0))
            .ok_or(ErrorCode::InsufficientMemoryError)?;
        vm.mem.set_field(result, 0, int2obj(total as i32));
        let mut dst = 1;
        for &arg in args {
            for i in 1..=list_count(&vm.mem, arg) {
                let item = vm.mem.field(arg, i);
                vm.mem.set_field(result, dst, item);
                dst += 1;
            }
        }
        return Ok(result);
    }
    if vm.mem.is_class(first, ClassId::String) {
        let mut bytes = Vec::new();
        for &arg in args {
            if vm.mem.is_class(arg, ClassId::String) {
                bytes.extend(vm.mem.string_bytes(arg));
            } else if let Some(text) = immediate_text(arg) {
                bytes.extend_from_slice(text.as_bytes());
            } else {
                return Err(ErrorCode::JoinArgsNotSameType);
            }
        }
        return vm
            .mem
            .new_string_from_bytes(&bytes)
            .ok_or(ErrorCode::InsufficientMemoryError);
    }
    Err(ErrorCode::NeedsIndexable)
}

fn prim_join_strings(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    let &list = args.first().ok_or(ErrorCode::NotEnoughArguments)?;
    if !vm.mem.is_class(list, ClassId::List) {
        return Err(ErrorCode::NeedsArrayError);
    }
    let count = list_count(&vm.mem, list);
    if count == 0 {
        return vm
            .mem
            .new_string_from_bytes(&[])
            .ok_or(ErrorCode::InsufficientMemoryError);
    }
    let separator = match args.get(1) {
        Some(&sep) if vm.mem.is_class(sep, ClassId::String) => vm.mem.string_bytes(sep),
        _ => Vec::new(),
    };
    let mut bytes = Vec::new();
    for i in 1..=count {
        let item = vm.mem.field(list, i);
        if vm.mem.is_class(item, ClassId::String) {
            bytes.extend(vm.mem.string_bytes(item));
        } else if let Some(text) = immediate_text(item) {
            bytes.extend_from_slice(text.as_bytes());
        }
        if i < count {
            bytes.extend_from_slice(&separator);
        }
    }
    vm.mem
        .new_string_from_bytes(&bytes)
        .ok_or(ErrorCode::InsufficientMemoryError)
}

fn prim_find_in_string(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() < 2 {
        return Err(ErrorCode::NotEnoughArguments);
    }
    let sought = args[0];
    let haystack = args[1];
    if !vm.mem.is_class(sought, ClassId::String) || !vm.mem.is_class(haystack, ClassId::String) {
        return Err(ErrorCode::NeedsStringError);
    }
    let start = match args.get(2) {
        Some(&arg) if arg.is_int() => obj2int(arg).max(1) as usize,
        _ => 1,
    };
    let hay = vm.mem.string_bytes(haystack);
    if start > hay.len() {
        return Ok(int2obj(-1));
    }
    let needle = vm.mem.string_bytes(sought);
    if needle.len() > hay.len() - (start - 1) {
        return Ok(int2obj(-1));
    }
    for pos in (start - 1)..=(hay.len() - needle.len()) {
        if hay[pos..pos + needle.len()] == needle[..] {
            return Ok(int2obj((pos + 1) as i32));
        }
    }
    Ok(int2obj(-1))
}

fn prim_free_memory(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    Ok(int2obj(vm.mem.free_words() as i32))
}

fn prim_print(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    let value = match args {
        [] => return Ok(FALSE_OBJ),
        [one] => obj_to_wire(&vm.mem, *one),
        many => {
            let text: Vec<String> = many.iter().map(|&o| printed_text(&vm.mem, o)).collect();
            bricklet_proto::WireValue::Str(text.join(" "))
        }
    };
    vm.push_output(value);
    Ok(FALSE_OBJ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TRUE_OBJ;

    fn vm() -> Vm {
        Vm::new(1024)
    }

    fn registry() -> PrimitiveRegistry {
        PrimitiveRegistry::with_builtins()
    }

    fn make_list(vm: &mut Vm, items: &[i32]) -> Obj {
        let args: Vec<Obj> = items.iter().map(|&n| int2obj(n)).collect();
        prim_make_list(vm, &args).unwrap()
    }

    fn list_items(vm: &Vm, list: Obj) -> Vec<i32> {
        (1..=list_count(&vm.mem, list))
            .map(|i| obj2int(vm.mem.field(list, i)))
            .collect()
    }

    #[test]
    fn make_list_stores_count_and_items() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[10, 20, 30]);
        assert_eq!(obj2int(vm.mem.field(list, 0)), 3);
        assert_eq!(list_items(&vm, list), vec![10, 20, 30]);
    }

    #[test]
    fn empty_list_grows_through_appends() {
        // makeList() is empty with capacity 2; five appends land in order.
        let mut vm = vm();
        let mut list = make_list(&mut vm, &[]);
        assert_eq!(vm.mem.obj_words(list), 3);
        for n in 1..=5 {
            list = prim_add_last(&mut vm, &[int2obj(n), list]).unwrap();
        }
        assert_eq!(obj2int(vm.mem.field(list, 0)), 5);
        assert!(vm.mem.obj_words(list) - 1 >= 5);
        assert_eq!(list_items(&vm, list), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn add_last_without_growth_keeps_identity() {
        let mut vm = vm();
        let list = prim_new_array(&mut vm, &[int2obj(4)]).unwrap();
        let same = prim_add_last(&mut vm, &[int2obj(9), list]).unwrap();
        assert_eq!(same, list);
        assert_eq!(list_items(&vm, list), vec![9]);
    }

    #[test]
    fn new_array_reserves_capacity_with_zero_count() {
        let mut vm = vm();
        let list = prim_new_array(&mut vm, &[int2obj(7)]).unwrap();
        assert_eq!(obj2int(vm.mem.field(list, 0)), 0);
        assert_eq!(vm.mem.obj_words(list), 8);
        let small = prim_new_array(&mut vm, &[int2obj(0)]).unwrap();
        assert_eq!(vm.mem.obj_words(small), 3);
    }

    #[test]
    fn at_basics() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[5, 6, 7]);
        assert_eq!(prim_at(&mut vm, &[int2obj(2), list]), Ok(int2obj(6)));
        let last = vm.mem.new_string("last").unwrap();
        assert_eq!(prim_at(&mut vm, &[last, list]), Ok(int2obj(7)));
        assert_eq!(
            prim_at(&mut vm, &[int2obj(0), list]),
            Err(ErrorCode::IndexOutOfRangeError)
        );
        assert_eq!(
            prim_at(&mut vm, &[int2obj(4), list]),
            Err(ErrorCode::IndexOutOfRangeError)
        );
        assert_eq!(
            prim_at(&mut vm, &[TRUE_OBJ, list]),
            Err(ErrorCode::NeedsIntegerIndexError)
        );
    }

    #[test]
    fn at_random_stays_in_range() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[5, 6, 7]);
        let random = vm.mem.new_string("random").unwrap();
        for _ in 0..50 {
            let item = prim_at(&mut vm, &[random, list]).unwrap();
            assert!((5..=7).contains(&obj2int(item)));
        }
    }

    #[test]
    fn at_on_empty_list_fails() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[]);
        let last = vm.mem.new_string("last").unwrap();
        let random = vm.mem.new_string("random").unwrap();
        assert_eq!(prim_at(&mut vm, &[last, list]), Err(ErrorCode::IndexOutOfRangeError));
        assert_eq!(prim_at(&mut vm, &[random, list]), Err(ErrorCode::IndexOutOfRangeError));
    }

    #[test]
    fn at_put_variants() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[1, 2, 3]);
        prim_at_put(&mut vm, &[int2obj(2), list, int2obj(9)]).unwrap();
        assert_eq!(list_items(&vm, list), vec![1, 9, 3]);
        let all = vm.mem.new_string("all").unwrap();
        prim_at_put(&mut vm, &[all, list, int2obj(0)]).unwrap();
        assert_eq!(list_items(&vm, list), vec![0, 0, 0]);
        let last = vm.mem.new_string("last").unwrap();
        prim_at_put(&mut vm, &[last, list, int2obj(4)]).unwrap();
        assert_eq!(list_items(&vm, list), vec![0, 0, 4]);
    }

    #[test]
    fn delete_shifts_and_zeroes() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[1, 2, 3, 4]);
        prim_delete(&mut vm, &[int2obj(2), list]).unwrap();
        assert_eq!(list_items(&vm, list), vec![1, 3, 4]);
        // The freed slot past the new count is zero.
        assert_eq!(obj2int(vm.mem.field(list, 4)), 0);
        let last = vm.mem.new_string("last").unwrap();
        prim_delete(&mut vm, &[last, list]).unwrap();
        assert_eq!(list_items(&vm, list), vec![1, 3]);
        let all = vm.mem.new_string("all").unwrap();
        prim_delete(&mut vm, &[all, list]).unwrap();
        assert_eq!(list_count(&vm.mem, list), 0);
        for i in 1..vm.mem.obj_words(list) {
            assert_eq!(obj2int(vm.mem.field(list, i)), 0);
        }
    }

    #[test]
    fn copy_from_to_full_range_equals_original() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[4, 5, 6]);
        let copy = prim_copy_from_to(&mut vm, &[list, int2obj(1), int2obj(3)]).unwrap();
        assert_eq!(list_items(&vm, copy), vec![4, 5, 6]);
        // End defaults to the source length, and is clamped.
        let copy = prim_copy_from_to(&mut vm, &[list, int2obj(2)]).unwrap();
        assert_eq!(list_items(&vm, copy), vec![5, 6]);
        let copy = prim_copy_from_to(&mut vm, &[list, int2obj(2), int2obj(99)]).unwrap();
        assert_eq!(list_items(&vm, copy), vec![5, 6]);
        let empty = prim_copy_from_to(&mut vm, &[list, int2obj(3), int2obj(2)]).unwrap();
        assert_eq!(list_count(&vm.mem, empty), 0);
    }

    #[test]
    fn string_length_counts_codepoints() {
        let mut vm = vm();
        let s = vm.mem.new_string("héllo").unwrap();
        assert_eq!(prim_length(&mut vm, &[s]), Ok(int2obj(5)));
    }

    #[test]
    fn string_at_returns_single_codepoint() {
        let mut vm = vm();
        let s = vm.mem.new_string("héllo").unwrap();
        let ch = prim_at(&mut vm, &[int2obj(2), s]).unwrap();
        assert_eq!(vm.mem.string_text(ch), "é");
        let ch = prim_at(&mut vm, &[int2obj(1), s]).unwrap();
        assert_eq!(vm.mem.string_text(ch), "h");
    }

    #[test]
    fn string_copy_from_to_uses_codepoint_indices() {
        let mut vm = vm();
        let s = vm.mem.new_string("héllo").unwrap();
        let sub = prim_copy_from_to(&mut vm, &[s, int2obj(2), int2obj(4)]).unwrap();
        assert_eq!(vm.mem.string_text(sub), "éll");
        let empty = prim_copy_from_to(&mut vm, &[s, int2obj(9)]).unwrap();
        assert_eq!(vm.mem.string_size(empty), 0);
    }

    #[test]
    fn find_in_string_edges() {
        let mut vm = vm();
        let hay = vm.mem.new_string("abcabc").unwrap();
        let needle = vm.mem.new_string("bc").unwrap();
        let empty = vm.mem.new_string("").unwrap();
        assert_eq!(prim_find_in_string(&mut vm, &[needle, hay]), Ok(int2obj(2)));
        assert_eq!(
            prim_find_in_string(&mut vm, &[needle, hay, int2obj(3)]),
            Ok(int2obj(5))
        );
        assert_eq!(prim_find_in_string(&mut vm, &[empty, hay]), Ok(int2obj(1)));
        assert_eq!(
            prim_find_in_string(&mut vm, &[needle, hay, int2obj(7)]),
            Ok(int2obj(-1))
        );
        let missing = vm.mem.new_string("zz").unwrap();
        assert_eq!(prim_find_in_string(&mut vm, &[missing, hay]), Ok(int2obj(-1)));
    }

    #[test]
    fn join_concatenates_lists() {
        let mut vm = vm();
        let a = make_list(&mut vm, &[1, 2]);
        let b = make_list(&mut vm, &[3]);
        let joined = prim_join(&mut vm, &[a, b]).unwrap();
        assert_eq!(list_items(&vm, joined), vec![1, 2, 3]);
    }

    #[test]
    fn join_converts_immediates_into_strings() {
        let mut vm = vm();
        let s = vm.mem.new_string("n=").unwrap();
        let joined = prim_join(&mut vm, &[s, int2obj(42), TRUE_OBJ]).unwrap();
        assert_eq!(vm.mem.string_text(joined), "n=42true");
    }

    #[test]
    fn join_rejects_mixed_kinds() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[1]);
        let s = vm.mem.new_string("x").unwrap();
        assert_eq!(prim_join(&mut vm, &[list, s]), Err(ErrorCode::JoinArgsNotSameType));
        assert_eq!(prim_join(&mut vm, &[s, list]), Err(ErrorCode::JoinArgsNotSameType));
        assert_eq!(prim_join(&mut vm, &[int2obj(1), int2obj(2)]), Err(ErrorCode::NeedsIndexable));
    }

    #[test]
    fn join_strings_with_separator() {
        let mut vm = vm();
        let a = vm.mem.new_string("one").unwrap();
        let b = vm.mem.new_string("two").unwrap();
        let list = prim_make_list(&mut vm, &[a, int2obj(3), b]).unwrap();
        let sep = vm.mem.new_string(", ").unwrap();
        let joined = prim_join_strings(&mut vm, &[list, sep]).unwrap();
        assert_eq!(vm.mem.string_text(joined), "one, 3, two");
        let bare = prim_join_strings(&mut vm, &[list]).unwrap();
        assert_eq!(vm.mem.string_text(bare), "one3two");
    }

    #[test]
    fn byte_array_store_rules() {
        let mut vm = vm();
        let ba = prim_new_byte_array(&mut vm, &[int2obj(6)]).unwrap();
        assert_eq!(prim_length(&mut vm, &[ba]), Ok(int2obj(8)));
        prim_at_put(&mut vm, &[int2obj(1), ba, int2obj(255)]).unwrap();
        assert_eq!(prim_at(&mut vm, &[int2obj(1), ba]), Ok(int2obj(255)));
        assert_eq!(
            prim_at_put(&mut vm, &[int2obj(1), ba, int2obj(256)]),
            Err(ErrorCode::ByteArrayStoreError)
        );
        assert_eq!(
            prim_at_put(&mut vm, &[int2obj(1), ba, TRUE_OBJ]),
            Err(ErrorCode::ByteArrayStoreError)
        );
        assert_eq!(
            prim_at(&mut vm, &[int2obj(9), ba]),
            Err(ErrorCode::IndexOutOfRangeError)
        );
    }

    #[test]
    fn fill_list_and_byte_array() {
        let mut vm = vm();
        let list = make_list(&mut vm, &[1, 2, 3]);
        prim_fill(&mut vm, &[list, int2obj(8)]).unwrap();
        assert_eq!(list_items(&vm, list), vec![8, 8, 8]);
        let ba = prim_new_byte_array(&mut vm, &[int2obj(4)]).unwrap();
        prim_fill(&mut vm, &[ba, int2obj(0xAA)]).unwrap();
        assert_eq!(vm.mem.byte_array_bytes(ba), vec![0xAA; 4]);
        assert_eq!(
            prim_fill(&mut vm, &[ba, int2obj(300)]),
            Err(ErrorCode::ByteArrayStoreError)
        );
    }

    #[test]
    fn free_memory_shrinks_after_alloc() {
        let mut vm = vm();
        let before = obj2int(prim_free_memory(&mut vm, &[]).unwrap());
        make_list(&mut vm, &[1, 2, 3]);
        let after = obj2int(prim_free_memory(&mut vm, &[]).unwrap());
        assert!(after < before);
    }

    #[test]
    fn allocation_failure_propagates() {
        let mut vm = Vm::new(8);
        let args: Vec<Obj> = (0..32).map(int2obj).collect();
        assert_eq!(
            prim_make_list(&mut vm, &args),
            Err(ErrorCode::InsufficientMemoryError)
        );
    }

    #[test]
    fn print_pushes_typed_single_values() {
        let mut vm = vm();
        prim_print(&mut vm, &[int2obj(3)]).unwrap();
        let s = vm.mem.new_string("hi").unwrap();
        prim_print(&mut vm, &[s, int2obj(7)]).unwrap();
        assert_eq!(
            vm.take_output(),
            vec![
                bricklet_proto::WireValue::Int(3),
                bricklet_proto::WireValue::Str("hi 7".into()),
            ]
        );
    }

    #[test]
    fn utf8_scanner() {
        let bytes = "aé€".as_bytes();
        assert_eq!(next_utf8(bytes, 0), 1);
        assert_eq!(next_utf8(bytes, 1), 3);
        assert_eq!(next_utf8(bytes, 3), 6);
        assert_eq!(next_utf8(bytes, 6), 6);
        assert_eq!(count_utf8(bytes), 3);
        assert_eq!(count_utf8(b""), 0);
    }

    #[test]
    fn registry_covers_data_set() {
        let reg = registry();
        for name in [
            "makeList", "newArray", "newByteArray", "length", "at", "atPut", "addLast",
            "delete", "fill", "copyFromTo", "join", "joinStrings", "findInString",
            "freeMemory",
        ] {
            assert!(reg.lookup("data", name).is_some(), "missing data:{name}");
        }
    }
}
