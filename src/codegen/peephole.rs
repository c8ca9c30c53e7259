//! Text-level cleanup over the emitted instruction lines. No dataflow, just
//! window patterns that the straight-line emitter produces routinely.

pub fn optimize(mut lines: Vec<String>) -> Vec<String> {
    let mut changed = true;
    while changed {
        changed = false;
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            let s = line.trim();

            if let Some(next) = lines.get(i + 1) {
                let next_s = next.trim();

                // jmp to the label on the next line
                if let Some(target) = s.strip_prefix("jmp ") {
                    if next_s == format!("{target}:") {
                        i += 1;
                        changed = true;
                        continue;
                    }
                }

                // push A / pop A cancels; push A / pop B is a mov
                if let (Some(a), Some(b)) =
                    (s.strip_prefix("push "), next_s.strip_prefix("pop "))
                {
                    if a == b {
                        i += 2;
                        changed = true;
                        continue;
                    }
                    if a.starts_with('%') && b.starts_with('%') {
                        out.push(format!("    mov {a}, {b}"));
                        i += 2;
                        changed = true;
                        continue;
                    }
                }
            }

            // add/sub $0 is a no-op
            if s.starts_with("add $0,") || s.starts_with("sub $0,") {
                i += 1;
                changed = true;
                continue;
            }

            // mov A, A on a 64-bit register is a no-op; the 32-bit form
            // zero-extends and must stay
            if let Some(rest) = s.strip_prefix("mov ") {
                let parts: Vec<&str> = rest.split(", ").collect();
                if parts.len() == 2 && parts[0] == parts[1] && parts[0].starts_with("%r") {
                    i += 1;
                    changed = true;
                    continue;
                }
            }

            out.push(line.clone());
            i += 1;
        }
        lines = out;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &[&str]) -> Vec<String> {
        optimize(input.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn drops_jump_to_next_line() {
        let out = run(&["    jmp .L1", ".L1:", "    ret"]);
        assert_eq!(out, vec![".L1:", "    ret"]);
    }

    #[test]
    fn cancels_push_pop_pairs() {
        let out = run(&["    push %rax", "    pop %rax", "    ret"]);
        assert_eq!(out, vec!["    ret"]);
    }

    #[test]
    fn rewrites_push_pop_to_mov() {
        let out = run(&["    push %rax", "    pop %rcx"]);
        assert_eq!(out, vec!["    mov %rax, %rcx"]);
    }

    #[test]
    fn keeps_mov_eax_eax() {
        // mov %eax, %eax zero-extends; it is not a no-op
        let out = run(&["    mov %eax, %eax"]);
        assert_eq!(out, vec!["    mov %eax, %eax"]);
    }

    #[test]
    fn drops_mov_rax_rax() {
        let out = run(&["    mov %rax, %rax", "    ret"]);
        assert_eq!(out, vec!["    ret"]);
    }
}
