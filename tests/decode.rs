// End-to-end generation from small instruction tables

use mr_decgen::{generate, Generated, GenerateOption};

const HEADER: &str =
    "Name,Form,Class,Opcode,XO,Subdec,spr,BO,Rc,SO,AA,LK,Priv,Lock,DE_OP,EXE_OP,MEM_OP,WB_OP";

fn run(rows: &str) -> anyhow::Result<Generated> {
    generate(&format!("{HEADER}\n{rows}\n"), GenerateOption::default())
}

#[test]
fn x_form_row_reaches_a_nested_leaf() -> anyhow::Result<()> {
    let out = run("lwzx,X,Ld,31,23,,,,,,,,,0,A=RA0;B=RB,R0=alu_add,L32,RT=R0")?;

    // primary opcode dispatch, then the extended opcode
    assert!(out.decoder.contains("casez(instruction[31:26])"));
    assert!(out.decoder.contains("6'b011111: begin"));
    assert!(out.decoder.contains("instruction[10:1] == 10'b0000010111"));
    assert!(out.decoder.contains("name = \"lwzx\";"));

    // each stage's signals land in the leaf
    assert!(out.decoder.contains("de_porta_checkz_gpr = `CHECK_INST_RA;"));
    assert!(out.decoder.contains("exe_R0 = `EXUNIT_INT;"));
    assert!(out.decoder.contains("mem_op = `MEM_LOAD;"));
    assert!(out.decoder.contains("wb_write_gpr_port0_reg = INST_RT;"));
    // decode locks what writeback unlocks
    assert!(out.decoder.contains("`LOCK_GPR(INST_RT);"));
    assert!(out.decoder.contains("`UNLOCK_GPR_PORT0(INST_RT);"));

    // unmatched words fault at the case default and at the inner else
    assert!(out
        .decoder
        .matches("de_gen_fault_type = `FC_PROG_ILL;")
        .count()
        >= 2);

    assert!(out.sigdefs.contains("`define DEC_AUTO_SIGS_DECLARE"));
    assert!(out.sigdefs.contains("`define DEC_RANGE_MEM_OP"));
    assert!(out.sigdefs.contains("wb_write_gpr_port0_from"));
    Ok(())
}

#[test]
fn branch_options_subdecode_emits_wildcard_condition() -> anyhow::Result<()> {
    let out = run(
        "bc,B,Flow,16,,1,,0b001xx,,,1,1,,0,A=BD,\"R0=br_dest_rel;br_annul(T, Z)\",R0,",
    )?;

    assert!(out.decoder.contains("6'b010000: begin"));
    // the two don't-care bits collapse to one fixed-run equality
    assert!(out
        .decoder
        .contains("/* [25:21] = 001?? */ (instruction[25:23] == 3'b001)"));
    assert!(out.decoder.contains("name = \"bc\";"));
    assert!(out.decoder.contains("exe_brcond = `EXOP_BRCOND_T_Z;"));
    Ok(())
}

#[test]
fn unknown_micro_op_aborts_naming_op_and_instruction() {
    let err = run("mystery,X,Int,31,100,,,,,,,,,0,A=RA,R0=frobnicate,,").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("R0=frobnicate"), "{msg}");
    assert!(msg.contains("mystery"), "{msg}");
}

#[test]
fn disjoint_spr_subdecodes_share_an_extended_opcode() -> anyhow::Result<()> {
    let out = run("mtspr,XFX,Spr,31,467,1,9,,,,,,,0,C=RS,R0=C,R0,spr_CTR=R0\n\
                   mtspr,XFX,Spr,31,467,1,1,,,,,,,0,C=RS,R0=C,R0,spr_XER=R0")?;

    assert!(out.decoder.contains("instruction[10:1] == 10'b0111010011"));
    // swizzled SPR numbers 9 and 1
    assert!(out.decoder.contains("instruction[20:11] == 10'b0100100000"));
    assert!(out.decoder.contains("instruction[20:11] == 10'b0000100000"));
    assert_eq!(out.decoder.matches("name = \"mtspr\";").count(), 2);
    assert!(out.decoder.contains("wb_write_spr_num = `DE_spr_CTR;"));
    assert!(out.decoder.contains("wb_write_spr_num = `DE_spr_XER;"));
    Ok(())
}

#[test]
fn duplicate_dispatch_slot_aborts() {
    let err = run("a,X,Int,31,23,,,,,,,,,0,A=RA,R0=alu_add,R0,RT=R0\n\
                   b,X,Int,31,23,,,,,,,,,0,A=RA,R0=alu_sub,R0,RT=R0")
        .unwrap_err();
    assert!(err.to_string().contains("already used"));
}

#[test]
fn duplicate_spr_subdecode_slot_aborts() {
    // same mnemonic, same SPR number: the swizzled patterns collide
    let err = run("mtspr,XFX,Spr,31,467,1,9,,,,,,,0,C=RS,R0=C,R0,spr_CTR=R0\n\
                   mtspr,XFX,Spr,31,467,1,9,,,,,,,0,C=RS,R0=C,R0,spr_CTR=R0")
        .unwrap_err();
    assert!(err.to_string().contains("already used"));
}

#[test]
fn software_only_rows_are_skipped() -> anyhow::Result<()> {
    let out = run("sc,SC,Flow,17,,0,,,,,,,,0,,,,\n\
                   addi,D,Int,14,,,,,,,,,,0,A=RA0;B=SI,R0=alu_add,R0,RT=R0")?;
    assert!(!out.decoder.contains("name = \"sc\";"));
    assert!(out.decoder.contains("name = \"addi\";"));
    Ok(())
}

#[test]
fn outputs_round_trip_through_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let table = dir.path().join("insts.csv");
    std::fs::write(
        &table,
        format!("{HEADER}\naddi,D,Int,14,,,,,,,,,,0,A=RA0;B=SI,R0=alu_add,R0,RT=R0\n"),
    )?;

    let content = std::fs::read_to_string(&table)?;
    let out = generate(&content, GenerateOption::default())?;

    let decoder = dir.path().join("decode_body.vh");
    let sigdefs = dir.path().join("autosigdefs.vh");
    std::fs::write(&decoder, &out.decoder)?;
    std::fs::write(&sigdefs, &out.sigdefs)?;

    let body = std::fs::read_to_string(&decoder)?;
    assert!(body.contains("6'b001110: begin"));
    let defs = std::fs::read_to_string(&sigdefs)?;
    assert!(defs.starts_with("`ifndef AUTOSIGDEFS_VH"));
    assert!(defs.trim_end().ends_with("`endif"));
    Ok(())
}
